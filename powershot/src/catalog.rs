//! Canon USB command tables, as found in gphoto2's `camlibs/canon/usb.c`.
//!
//! Where gphoto2 lists several commands under one `(cmd1, cmd2)` pair for
//! different camera generations, only the variant the G3 speaks is kept.

/// How the camera frames its answer to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Known total length, including the 0x40 byte header (`cmd3` 0x201).
    Fixed(usize),
    /// Length announced in the first 0x40 bytes (`cmd3` 0x202).
    Variable,
}

impl ResponseShape {
    pub const fn cmd3(&self) -> u32 {
        match self {
            ResponseShape::Fixed(_) => 0x201,
            ResponseShape::Variable => 0x202,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub cmd1: u8,
    pub cmd2: u8,
    pub shape: ResponseShape,
}

impl CommandDescriptor {
    const fn fixed(name: &'static str, description: &'static str, cmd1: u8, cmd2: u8, len: usize) -> Self {
        Self {
            name,
            description,
            cmd1,
            cmd2,
            shape: ResponseShape::Fixed(len),
        }
    }

    const fn variable(name: &'static str, description: &'static str, cmd1: u8, cmd2: u8) -> Self {
        Self {
            name,
            description,
            cmd1,
            cmd2,
            shape: ResponseShape::Variable,
        }
    }

    pub const fn cmd3(&self) -> u32 {
        self.shape.cmd3()
    }

    /// Expected response length, `None` for variable-length responses.
    pub const fn expected_len(&self) -> Option<usize> {
        match self.shape {
            ResponseShape::Fixed(len) => Some(len),
            ResponseShape::Variable => None,
        }
    }

    /// The `CONTROL_CAMERA` envelope sized for `rc`'s reply.
    pub const fn envelope_for(rc: &RcSubcommand) -> Self {
        let mut cmd = CONTROL_CAMERA;
        if let ResponseShape::Fixed(len) = cmd.shape {
            cmd.shape = ResponseShape::Fixed(len + rc.reply_len);
        }
        cmd
    }
}

/// A sub-command carried inside `CONTROL_CAMERA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcSubcommand {
    pub name: &'static str,
    pub description: &'static str,
    pub value: u32,
    pub cmd_len: usize,
    pub reply_len: usize,
}

impl RcSubcommand {
    const fn new(name: &'static str, description: &'static str, value: u32, cmd_len: usize, reply_len: usize) -> Self {
        Self {
            name,
            description,
            value,
            cmd_len,
            reply_len,
        }
    }
}

// storage commands (cmd2 0x11)
pub const GET_FILE: CommandDescriptor = CommandDescriptor::variable("GET_FILE", "Get file", 0x01, 0x11);
pub const MKDIR: CommandDescriptor = CommandDescriptor::fixed("MKDIR", "Make directory", 0x05, 0x11, 0x54);
pub const RMDIR: CommandDescriptor = CommandDescriptor::fixed("RMDIR", "Remove directory", 0x06, 0x11, 0x54);
pub const SET_ATTR_2: CommandDescriptor =
    CommandDescriptor::fixed("SET_ATTR_2", "Set file attributes (new)", 0x07, 0x11, 0x54);
pub const DISK_INFO: CommandDescriptor = CommandDescriptor::fixed("DISK_INFO", "Disk info request", 0x09, 0x11, 0x5c);
pub const FLASH_DEVICE_IDENT: CommandDescriptor =
    CommandDescriptor::variable("FLASH_DEVICE_IDENT", "Flash device ident", 0x0a, 0x11);
pub const GET_DIR: CommandDescriptor = CommandDescriptor::variable("GET_DIR", "Get directory entries", 0x0b, 0x11);
pub const DELETE_FILE: CommandDescriptor = CommandDescriptor::fixed("DELETE_FILE", "Delete file", 0x0d, 0x11, 0x54);
pub const SET_ATTR: CommandDescriptor = CommandDescriptor::fixed("SET_ATTR", "Set file attributes", 0x0e, 0x11, 0x54);
pub const SET_FILE_TIME: CommandDescriptor =
    CommandDescriptor::fixed("SET_FILE_TIME", "Set file time", 0x0f, 0x11, 0x54);

// camera commands (cmd2 0x12)
pub const IDENTIFY_CAMERA: CommandDescriptor =
    CommandDescriptor::fixed("IDENTIFY_CAMERA", "Identify camera", 0x01, 0x12, 0x9c);
pub const GET_TIME: CommandDescriptor = CommandDescriptor::fixed("GET_TIME", "Get time", 0x03, 0x12, 0x60);
pub const SET_TIME: CommandDescriptor = CommandDescriptor::fixed("SET_TIME", "Set time", 0x04, 0x12, 0x54);
pub const CAMERA_CHOWN: CommandDescriptor =
    CommandDescriptor::fixed("CAMERA_CHOWN", "Change camera owner", 0x05, 0x12, 0x54);
pub const CAMERA_CHOWN_2: CommandDescriptor =
    CommandDescriptor::fixed("CAMERA_CHOWN_2", "Change owner (new)", 0x06, 0x12, 0x54);
pub const POWER_STATUS: CommandDescriptor =
    CommandDescriptor::fixed("POWER_STATUS", "Power supply status", 0x0a, 0x12, 0x58);
pub const CONTROL_CAMERA: CommandDescriptor =
    CommandDescriptor::fixed("CONTROL_CAMERA", "Remote camera control", 0x13, 0x12, 0x40);
pub const RETRIEVE_CAPTURE: CommandDescriptor =
    CommandDescriptor::variable("RETRIEVE_CAPTURE", "Download a captured image", 0x17, 0x12);
pub const RETRIEVE_PREVIEW: CommandDescriptor =
    CommandDescriptor::variable("RETRIEVE_PREVIEW", "Download a captured preview", 0x18, 0x12);
pub const UNKNOWN_FUNCTION: CommandDescriptor =
    CommandDescriptor::fixed("UNKNOWN_FUNCTION", "Unknown function", 0x1a, 0x12, 0x80);
pub const EOS_LOCK_KEYS: CommandDescriptor =
    CommandDescriptor::fixed("EOS_LOCK_KEYS", "EOS lock keys", 0x1b, 0x12, 0x54);
pub const EOS_UNLOCK_KEYS: CommandDescriptor =
    CommandDescriptor::fixed("EOS_UNLOCK_KEYS", "EOS unlock keys", 0x1c, 0x12, 0x54);
pub const EOS_GET_BODY_ID: CommandDescriptor =
    CommandDescriptor::fixed("EOS_GET_BODY_ID", "EOS get body ID", 0x1d, 0x12, 0x58);
pub const GET_PIC_ABILITIES: CommandDescriptor =
    CommandDescriptor::fixed("GET_PIC_ABILITIES", "Get picture abilities", 0x1f, 0x12, 0x394);
pub const GENERIC_LOCK_KEYS: CommandDescriptor =
    CommandDescriptor::fixed("GENERIC_LOCK_KEYS", "Lock keys and turn off LCD", 0x20, 0x12, 0x54);
pub const EOS_GET_BODY_ID_2: CommandDescriptor =
    CommandDescriptor::fixed("EOS_GET_BODY_ID_2", "Get body ID (new)", 0x23, 0x12, 0x58);
pub const GET_PIC_ABILITIES_2: CommandDescriptor =
    CommandDescriptor::fixed("GET_PIC_ABILITIES_2", "Get picture abilities (new)", 0x24, 0x12, 0x474);
pub const CONTROL_CAMERA_2: CommandDescriptor =
    CommandDescriptor::fixed("CONTROL_CAMERA_2", "Remote camera control (new)", 0x25, 0x12, 0x40);
pub const RETRIEVE_CAPTURE_2: CommandDescriptor =
    CommandDescriptor::variable("RETRIEVE_CAPTURE_2", "Download captured image (new)", 0x26, 0x12);
pub const LOCK_KEYS_2: CommandDescriptor = CommandDescriptor::fixed("LOCK_KEYS_2", "Lock keys (new)", 0x35, 0x12, 0x5c);
pub const UNLOCK_KEYS_2: CommandDescriptor =
    CommandDescriptor::fixed("UNLOCK_KEYS_2", "Unlock keys (new)", 0x36, 0x12, 0x54);

pub static COMMANDS: &[CommandDescriptor] = &[
    GET_FILE,
    MKDIR,
    RMDIR,
    SET_ATTR_2,
    DISK_INFO,
    FLASH_DEVICE_IDENT,
    GET_DIR,
    DELETE_FILE,
    SET_ATTR,
    SET_FILE_TIME,
    IDENTIFY_CAMERA,
    GET_TIME,
    SET_TIME,
    CAMERA_CHOWN,
    CAMERA_CHOWN_2,
    POWER_STATUS,
    CONTROL_CAMERA,
    RETRIEVE_CAPTURE,
    RETRIEVE_PREVIEW,
    UNKNOWN_FUNCTION,
    EOS_LOCK_KEYS,
    EOS_UNLOCK_KEYS,
    EOS_GET_BODY_ID,
    GET_PIC_ABILITIES,
    GENERIC_LOCK_KEYS,
    EOS_GET_BODY_ID_2,
    GET_PIC_ABILITIES_2,
    CONTROL_CAMERA_2,
    RETRIEVE_CAPTURE_2,
    LOCK_KEYS_2,
    UNLOCK_KEYS_2,
];

pub const RC_INIT: RcSubcommand = RcSubcommand::new("CONTROL_INIT", "Camera control init", 0x00, 0x18, 0x1c);
pub const RC_EXIT: RcSubcommand = RcSubcommand::new("CONTROL_EXIT", "Exit release control", 0x01, 0x18, 0x1c);
pub const RC_VIEWFINDER_START: RcSubcommand =
    RcSubcommand::new("CONTROL_VIEWFINDER_START", "Start viewfinder", 0x02, 0x00, 0x00);
pub const RC_VIEWFINDER_STOP: RcSubcommand =
    RcSubcommand::new("CONTROL_VIEWFINDER_STOP", "Stop viewfinder", 0x03, 0x00, 0x00);
pub const RC_SHUTTER_RELEASE: RcSubcommand =
    RcSubcommand::new("CONTROL_SHUTTER_RELEASE", "Release shutter", 0x04, 0x18, 0x1c);
pub const RC_SET_PARAMS: RcSubcommand =
    RcSubcommand::new("CONTROL_SET_PARAMS", "Set release params", 0x07, 0x3c, 0x1c);
pub const RC_SET_TRANSFER_MODE: RcSubcommand =
    RcSubcommand::new("CONTROL_SET_TRANSFER_MODE", "Set transfer mode", 0x09, 0x1c, 0x1c);
pub const RC_GET_PARAMS: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_PARAMS", "Get release params", 0x0a, 0x18, 0x4c);
pub const RC_GET_ZOOM_POS: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_ZOOM_POS", "Get zoom position", 0x0b, 0x18, 0x20);
pub const RC_SET_ZOOM_POS: RcSubcommand =
    RcSubcommand::new("CONTROL_SET_ZOOM_POS", "Set zoom position", 0x0c, 0x1c, 0x1c);
pub const RC_GET_AVAILABLE_SHOT: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_AVAILABLE_SHOT", "Get available shot", 0x0d, 0x18, 0x20);
pub const RC_SET_CUSTOM_FUNC: RcSubcommand =
    RcSubcommand::new("CONTROL_SET_CUSTOM_FUNC", "Set custom func.", 0x0e, 0x00, 0x00);
pub const RC_GET_CUSTOM_FUNC: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_CUSTOM_FUNC", "Get custom func.", 0x0f, 0x22, 0x26);
pub const RC_GET_EXT_PARAMS_SIZE: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_EXT_PARAMS_SIZE", "Get ext. release params size", 0x10, 0x1c, 0x20);
pub const RC_GET_EXT_PARAMS_VER: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_EXT_PARAMS_VER", "Get extended params version", 0x11, 0x00, 0x00);
pub const RC_GET_EXT_PARAMS: RcSubcommand =
    RcSubcommand::new("CONTROL_GET_EXT_PARAMS", "Get ext. release params", 0x12, 0x1c, 0x2c);
pub const RC_SET_EXT_PARAMS: RcSubcommand =
    RcSubcommand::new("CONTROL_SET_EXT_PARAMS", "Set extended params", 0x13, 0x15, 0x1c);
pub const RC_SELECT_CAM_OUTPUT: RcSubcommand =
    RcSubcommand::new("CONTROL_SELECT_CAM_OUTPUT", "Select camera output", 0x14, 0x00, 0x00);
pub const RC_UNKNOWN_1: RcSubcommand =
    RcSubcommand::new("CONTROL_UNKNOWN_1", "Unknown remote subcode", 0x1b, 0x08, 0x5e);
pub const RC_UNKNOWN_2: RcSubcommand =
    RcSubcommand::new("CONTROL_UNKNOWN_2", "Unknown remote subcode", 0x1c, 0x00, 0x00);

pub static RC_COMMANDS: &[RcSubcommand] = &[
    RC_INIT,
    RC_EXIT,
    RC_VIEWFINDER_START,
    RC_VIEWFINDER_STOP,
    RC_SHUTTER_RELEASE,
    RC_SET_PARAMS,
    RC_SET_TRANSFER_MODE,
    RC_GET_PARAMS,
    RC_GET_ZOOM_POS,
    RC_SET_ZOOM_POS,
    RC_GET_AVAILABLE_SHOT,
    RC_SET_CUSTOM_FUNC,
    RC_GET_CUSTOM_FUNC,
    RC_GET_EXT_PARAMS_SIZE,
    RC_GET_EXT_PARAMS_VER,
    RC_GET_EXT_PARAMS,
    RC_SET_EXT_PARAMS,
    RC_SELECT_CAM_OUTPUT,
    RC_UNKNOWN_1,
    RC_UNKNOWN_2,
];

pub fn lookup(cmd1: u8, cmd2: u8) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.cmd1 == cmd1 && c.cmd2 == cmd2)
}

pub fn lookup_by_name(name: &str) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub fn lookup_rc(value: u32) -> Option<&'static RcSubcommand> {
    RC_COMMANDS.iter().find(|c| c.value == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn one_descriptor_per_opcode_pair() {
        assert!(COMMANDS.iter().map(|c| (c.cmd1, c.cmd2)).all_unique());
        assert!(COMMANDS.iter().map(|c| c.name).all_unique());
    }

    #[test]
    fn one_descriptor_per_subcode() {
        assert!(RC_COMMANDS.iter().map(|c| c.value).all_unique());
    }

    #[test]
    fn lookups() {
        assert_eq!(lookup(0x01, 0x12), Some(&IDENTIFY_CAMERA));
        assert_eq!(lookup(0x0b, 0x11).map(|c| c.shape), Some(ResponseShape::Variable));
        assert_eq!(lookup(0x42, 0x12), None);
        assert_eq!(lookup_by_name("GET_TIME"), Some(&GET_TIME));
        assert_eq!(lookup_rc(0x04), Some(&RC_SHUTTER_RELEASE));
        assert_eq!(lookup_rc(0x99), None);
    }

    #[test]
    fn cmd3_follows_shape() {
        assert_eq!(IDENTIFY_CAMERA.cmd3(), 0x201);
        assert_eq!(GET_DIR.cmd3(), 0x202);
        assert_eq!(GET_DIR.expected_len(), None);
        assert_eq!(GET_TIME.expected_len(), Some(0x60));
    }

    #[test]
    fn envelope_grows_by_reply_len() {
        let cmd = CommandDescriptor::envelope_for(&RC_GET_PARAMS);
        assert_eq!((cmd.cmd1, cmd.cmd2), (0x13, 0x12));
        assert_eq!(cmd.expected_len(), Some(0x40 + 0x4c));
        // the static entry is untouched
        assert_eq!(CONTROL_CAMERA.expected_len(), Some(0x40));
    }
}
