mod common;

use powershot::catalog::{FLASH_DEVICE_IDENT, GET_DIR, GET_FILE};
use powershot::codec::le32;
use powershot::FsAttributes;

use common::{camera, init_logging, variable_response, FakeCamera};

fn record(attributes: u8, size: u32, name: &str) -> Vec<u8> {
    let mut raw = vec![attributes, 0];
    raw.extend_from_slice(&size.to_le_bytes());
    raw.extend_from_slice(&0x4e5d_0000u32.to_le_bytes());
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);
    raw
}

fn card() -> FakeCamera {
    let fake = FakeCamera::new();
    fake.respond(&FLASH_DEVICE_IDENT, variable_response(b"A:\0"));
    fake
}

fn packets_for(fake: &FakeCamera, key: (u8, u8)) -> Vec<Vec<u8>> {
    fake.command_packets()
        .into_iter()
        .filter(|p| (p[0x44], p[0x47]) == key)
        .collect()
}

#[test]
fn drive_name() {
    let fake = card();
    let mut camera = camera(&fake);
    assert_eq!(camera.storage().drive().unwrap(), "A:");
}

#[test]
fn listing_builds_a_tree() {
    init_logging();
    let fake = card();
    let listing = [
        record(0x10, 0, "DCIM"),
        record(0x80, 0, "DIR_A"),
        record(0x20, 0x1500, "FILE.JPG"),
        record(0x00, 0, ".."),
        vec![0; 11],
    ]
    .concat();
    fake.respond(&GET_DIR, variable_response(&listing));
    let mut camera = camera(&fake);

    let tree = camera.list("DCIM", 3).unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.root().name, "DCIM");

    let file = tree.find("DIR_A\\FILE.JPG").unwrap();
    let entry = tree.get(file).unwrap();
    assert_eq!(entry.size, 0x1500);
    assert_eq!(entry.timestamp, 0x4e5d_0000);
    assert!(entry.attributes.contains(FsAttributes::NOT_DOWNLOADED));
    assert!(!entry.is_dir());
    assert_eq!(tree.path(file).unwrap(), "A:\\DCIM\\DIR_A\\FILE.JPG");

    let packets = packets_for(&fake, (GET_DIR.cmd1, GET_DIR.cmd2));
    let mut expected = vec![3u8];
    expected.extend_from_slice(b"A:\\DCIM");
    expected.extend_from_slice(&[0, 0, 0]);
    assert_eq!(&packets[0][0x50..], expected.as_slice());
}

#[test]
fn empty_listing_is_an_error() {
    let fake = card();
    fake.respond(&GET_DIR, variable_response(&[0; 11]));
    let mut camera = camera(&fake);

    assert!(camera.list("", 1).is_err());
}

#[test]
fn download_streams_in_chunks() {
    init_logging();
    let fake = card();
    let content: Vec<u8> = (0..0x1500u32).map(|i| (i % 251) as u8).collect();
    fake.respond(&GET_FILE, variable_response(&content));
    let mut camera = camera(&fake);

    let mut sink = Vec::new();
    let written = camera.download("DCIM\\DIR_A\\FILE.JPG", &mut sink, false).unwrap();
    assert_eq!(written, 0x1500);
    assert_eq!(sink, content);

    // drive lookup first, then the header and two chunks of the file
    let reads = fake.state().bulk_reads.clone();
    assert_eq!(&reads[reads.len() - 3..], &[0x40, 0x1400, 0x100]);

    let packets = packets_for(&fake, (GET_FILE.cmd1, GET_FILE.cmd2));
    let packet = &packets[0];
    assert_eq!(le32(packet, 0x50).unwrap(), 0);
    assert_eq!(le32(packet, 0x54).unwrap(), 0x1400);
    assert_eq!(&packet[0x58..], b"A:\\DCIM\\DIR_A\\FILE.JPG\0");
}

#[test]
fn thumbnail_download_sets_flag() {
    let fake = card();
    fake.respond(&GET_FILE, variable_response(&[0xff, 0xd8, 0xff, 0xd9]));
    let mut camera = camera(&fake);

    let mut sink = Vec::new();
    assert_eq!(camera.download("A:\\DCIM\\IMG.JPG", &mut sink, true).unwrap(), 4);
    assert_eq!(sink, vec![0xff, 0xd8, 0xff, 0xd9]);

    let packets = packets_for(&fake, (GET_FILE.cmd1, GET_FILE.cmd2));
    assert_eq!(le32(&packets[0], 0x50).unwrap(), 1);
    assert_eq!(&packets[0][0x58..], b"A:\\DCIM\\IMG.JPG\0");
}

#[test]
fn interrupted_download_reports_usb_error() {
    let fake = card();
    let mut response = variable_response(&vec![0x11; 0x1500]);
    response.truncate(0x40 + 0x1400);
    fake.respond(&GET_FILE, response);
    let mut camera = camera(&fake);

    let mut sink = Vec::new();
    let err = camera.download("IMG.JPG", &mut sink, false).unwrap_err();
    assert!(err.is_transport());
    // what arrived before the failure was already handed to the sink
    assert_eq!(sink.len(), 0x1400);
}
