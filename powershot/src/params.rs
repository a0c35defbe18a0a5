//! Remote-capture parameter blocks.
//!
//! Offsets and values were observed on a G3 and need not hold for other
//! PowerShot models.

use std::fmt;

use bitflags::bitflags;

use crate::bitfield::{Field, ParameterBlock};

bitflags! {
    /// Where the camera sends captured thumbnails and full images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransferMode: u8 {
        const THUMB_TO_PC    = 0x01;
        const FULL_TO_PC     = 0x02;
        const THUMB_TO_DRIVE = 0x04;
        const FULL_TO_DRIVE  = 0x08;
    }
}

const fn triple(a: u8, b: u8, c: u8) -> u64 {
    a as u64 | (b as u64) << 8 | (c as u64) << 16
}

const IMAGE_FORMATS: &[(&str, u64)] = &[
    ("RAW", triple(0x04, 0x02, 0x00)),
    ("SMALL_NORMAL_JPEG", triple(0x02, 0x01, 0x02)),
    ("SMALL_FINE_JPEG", triple(0x03, 0x01, 0x02)),
    ("MEDIUM_NORMAL_JPEG", triple(0x02, 0x01, 0x01)),
    ("MEDIUM_FINE_JPEG", triple(0x03, 0x01, 0x01)),
    ("LARGE_NORMAL_JPEG", triple(0x02, 0x01, 0x00)),
    ("LARGE_FINE_JPEG", triple(0x03, 0x01, 0x00)),
    ("RAW_AND_SMALL_NORMAL_JPEG", triple(0x24, 0x12, 0x20)),
    ("RAW_AND_SMALL_FINE_JPEG", triple(0x34, 0x12, 0x20)),
    ("RAW_AND_MEDIUM_NORMAL_JPEG", triple(0x24, 0x12, 0x10)),
    ("RAW_AND_MEDIUM_FINE_JPEG", triple(0x34, 0x12, 0x10)),
    ("RAW_AND_LARGE_NORMAL_JPEG", triple(0x24, 0x12, 0x00)),
    ("RAW_AND_LARGE_FINE_JPEG", triple(0x34, 0x12, 0x00)),
];

const FOCUS_MODES: &[(&str, u64)] = &[
    ("ONE_SHOT", 0),
    ("AI_SERVO", 1),
    ("AI_FOCUS", 2),
    ("MANUAL", 3),
];

const ISO_SPEEDS: &[(&str, u64)] = &[
    ("ISO_50", 0x40),
    ("ISO_100", 0x48),
    ("ISO_125", 0x4b),
    ("ISO_160", 0x4d),
    ("ISO_200", 0x50),
    ("ISO_250", 0x53),
    ("ISO_320", 0x55),
    ("ISO_400", 0x58),
    ("ISO_500", 0x5b),
    ("ISO_640", 0x5d),
    ("ISO_800", 0x60),
    ("ISO_1000", 0x63),
    ("ISO_1250", 0x65),
    ("ISO_1600", 0x68),
    ("ISO_3200", 0x70),
];

const APERTURES: &[(&str, u64)] = &[
    ("F1_2", 0x0d),
    ("F1_4", 0x10),
    ("F1_6", 0x13),
    ("F1_8", 0x15),
    ("F2_0", 0x18),
    ("F2_2", 0x1b),
    ("F2_5", 0x1d),
    ("F2_8", 0x20),
    ("F3_2", 0x23),
    ("F3_5", 0x25),
    ("F4_0", 0x28),
    ("F4_5", 0x2b),
    ("F5_0", 0x2d),
    ("F5_6", 0x30),
    ("F6_3", 0x33),
    ("F7_1", 0x35),
    ("F8", 0x38),
    ("F9", 0x3b),
    ("F10", 0x3d),
    ("F11", 0x40),
    ("F13", 0x43),
    ("F14", 0x45),
    ("F16", 0x48),
    ("F18", 0x4b),
    ("F20", 0x4d),
    ("F22", 0x50),
    ("F25", 0x53),
    ("F29", 0x55),
    ("F32", 0x58),
];

const SHUTTER_SPEEDS: &[(&str, u64)] = &[
    ("BULB", 0x04),
    ("30_SEC", 0x10),
    ("25_SEC", 0x13),
    ("20_SEC", 0x15),
    ("15_SEC", 0x18),
    ("13_SEC", 0x1b),
    ("10_SEC", 0x1d),
    ("8_SEC", 0x20),
    ("6_SEC", 0x23),
    ("5_SEC", 0x25),
    ("4_SEC", 0x28),
    ("3_2_SEC", 0x2b),
    ("2_5_SEC", 0x2d),
    ("2_SEC", 0x30),
    ("1_6_SEC", 0x32),
    ("1_3_SEC", 0x35),
    ("1_SEC", 0x38),
    ("0_8_SEC", 0x3b),
    ("0_6_SEC", 0x3d),
    ("0_5_SEC", 0x40),
    ("0_4_SEC", 0x43),
    ("0_3_SEC", 0x45),
    ("1_4", 0x48),
    ("1_5", 0x4b),
    ("1_6", 0x4d),
    ("1_8", 0x50),
    ("1_10", 0x53),
    ("1_13", 0x55),
    ("1_15", 0x58),
    ("1_20", 0x5b),
    ("1_25", 0x5d),
    ("1_30", 0x60),
    ("1_40", 0x63),
    ("1_50", 0x65),
    ("1_60", 0x68),
    ("1_80", 0x6b),
    ("1_100", 0x6d),
    ("1_125", 0x70),
    ("1_160", 0x73),
    ("1_200", 0x75),
    ("1_250", 0x78),
    ("1_320", 0x7b),
    ("1_400", 0x7d),
    ("1_500", 0x80),
    ("1_640", 0x83),
    ("1_800", 0x85),
    ("1_1000", 0x88),
    ("1_1250", 0x8b),
    ("1_1600", 0x8d),
    ("1_2000", 0x90),
    ("1_2500", 0x93),
    ("1_3200", 0x95),
    ("1_4000", 0x98),
    ("1_5000", 0x9a),
    ("1_6400", 0x9d),
    ("1_8000", 0xa0),
];

const EXPOSURE_BIASES: &[(&str, u64)] = &[
    ("PLUS_2", 0x10),
    ("PLUS_1_2_3", 0x0d),
    ("PLUS_1_1_2", 0x0c),
    ("PLUS_1_1_3", 0x0b),
    ("PLUS_1", 0x08),
    ("PLUS_0_2_3", 0x05),
    ("PLUS_0_1_2", 0x04),
    ("PLUS_0_1_3", 0x03),
    ("ZERO", 0x00),
    ("MINUS_0_1_3", 0xfd),
    ("MINUS_0_1_2", 0xfc),
    ("MINUS_0_2_3", 0xfb),
    ("MINUS_1", 0xf8),
    ("MINUS_1_1_3", 0xf5),
    ("MINUS_1_1_2", 0xf4),
    ("MINUS_1_2_3", 0xf3),
    ("MINUS_2", 0xf0),
];

const RELEASE_PARAMS_LEN: usize = 0x2f;

/// The 0x2f byte release parameter block of the remote-control protocol.
#[derive(Clone, PartialEq, Eq)]
pub struct ReleaseParams([u8; RELEASE_PARAMS_LEN]);

impl ReleaseParams {
    pub const IMAGE_FORMAT: Field = Field::new("image_format", 0x01, 3).with_choices(IMAGE_FORMATS);
    pub const FLASH: Field = Field::new("flash", 0x06, 1).with_choices(&[("off", 0x00), ("on", 0x01), ("auto", 0x02)]);
    pub const BEEP: Field = Field::new("beep", 0x07, 1).with_choices(&[("off", 0x00), ("on", 0x01)]);
    pub const SHOOTING_MODE: Field = Field::new("shooting_mode", 0x08, 1);
    pub const MACRO: Field = Field::new("macro", 0x0d, 1).with_choices(&[("off", 0x01), ("on", 0x03)]);
    pub const FOCUS_MODE: Field = Field::new("focus_mode", 0x12, 1).with_choices(FOCUS_MODES);
    pub const ISO: Field = Field::new("iso", 0x1a, 1).with_choices(ISO_SPEEDS);
    pub const APERTURE: Field = Field::new("aperture", 0x1c, 1).with_choices(APERTURES);
    pub const SHUTTER_SPEED: Field = Field::new("shutter_speed", 0x1e, 1).with_choices(SHUTTER_SPEEDS);
    pub const EXPOSURE_BIAS: Field = Field::new("exposure_bias", 0x20, 1).with_choices(EXPOSURE_BIASES);

    /// Set `field` to its choice named `name`.
    pub fn set_choice(&mut self, field: &Field, name: &str) -> crate::Result<()> {
        field.set_choice(&mut self.0, name)
    }

    /// Name of the choice `field` currently holds.
    pub fn choice_name(&self, field: &Field) -> crate::Result<Option<&'static str>> {
        field.choice_name(&self.0)
    }
}

impl ParameterBlock for ReleaseParams {
    const SIZE: usize = RELEASE_PARAMS_LEN;
    const FIELDS: &'static [Field] = &[
        Self::IMAGE_FORMAT,
        Self::FLASH,
        Self::BEEP,
        Self::SHOOTING_MODE,
        Self::MACRO,
        Self::FOCUS_MODE,
        Self::ISO,
        Self::APERTURE,
        Self::SHUTTER_SPEED,
        Self::EXPOSURE_BIAS,
    ];

    fn from_bytes_unchecked(bytes: &[u8]) -> Self {
        let mut raw = [0u8; RELEASE_PARAMS_LEN];
        raw.copy_from_slice(bytes);
        ReleaseParams(raw)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for ReleaseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ReleaseParams");
        for field in Self::FIELDS {
            match (field.choice_name(&self.0), field.get(&self.0)) {
                (Ok(Some(name)), _) => s.field(field.name, &name),
                (_, Ok(value)) => s.field(field.name, &format_args!("{:#x}", value)),
                (_, Err(_)) => s.field(field.name, &"?"),
            };
        }
        s.finish()
    }
}
