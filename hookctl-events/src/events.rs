use std::fmt;

/// Category of an event, as set by the kernel program. The discriminants are
/// part of the protocol shared with the kernel program and must be kept in
/// sync with it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Category {
    Info,
    Debug,
    Exit,
    Error,
    Command,
    /// Value outside of the known set. Holds the raw value for reporting.
    Unknown(u32),
}

impl Category {
    /// Constructs a Category from its raw representation.
    pub fn from_raw(val: u32) -> Self {
        use Category::*;
        match val {
            0 => Info,
            1 => Debug,
            2 => Exit,
            3 => Error,
            4 => Command,
            x => Unknown(x),
        }
    }

    /// Raw representation, as found in the kernel records.
    pub fn to_raw(self) -> u32 {
        use Category::*;
        match self {
            Info => 0,
            Debug => 1,
            Exit => 2,
            Error => 3,
            Command => 4,
            Unknown(x) => x,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Category::*;
        match self {
            Info => write!(f, "INFO"),
            Debug => write!(f, "DEBUG"),
            Exit => write!(f, "EXIT"),
            Error => write!(f, "ERROR"),
            Command => write!(f, "COMMAND"),
            Unknown(x) => write!(f, "UNKNOWN({x})"),
        }
    }
}

/// Commands carried in the `code` field of COMMAND events.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    /// Open an outbound encrypted session.
    EncryptedShell,
    /// Enable all hook families and reinstall them.
    HookActivateAll,
    /// Disable all hook families and remove them.
    HookDeactivateAll,
    /// Code outside of the known set.
    Unknown(i32),
}

impl Command {
    /// Decodes a command code. Never fails, unknown codes are kept as
    /// `Command::Unknown` so callers have to handle them explicitly.
    pub fn from_code(code: i32) -> Self {
        use Command::*;
        match code {
            0 => EncryptedShell,
            1 => HookActivateAll,
            2 => HookDeactivateAll,
            x => Unknown(x),
        }
    }

    pub fn code(self) -> i32 {
        use Command::*;
        match self {
            EncryptedShell => 0,
            HookActivateAll => 1,
            HookDeactivateAll => 2,
            Unknown(x) => x,
        }
    }
}

/// A single record received from the kernel program.
///
/// Events are immutable once decoded and are not retained after being
/// dispatched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub category: Category,
    /// Process id of the task that triggered the event.
    pub pid: u32,
    /// Category specific code. For COMMAND events this holds the command.
    pub code: i32,
    /// Free form message, possibly empty.
    pub message: String,
}

impl Event {
    pub fn new<S: Into<String>>(category: Category, pid: u32, code: i32, message: S) -> Self {
        Self {
            category,
            pid,
            code,
            message: message.into(),
        }
    }

    /// Returns the command carried by the event, if the event is a command.
    pub fn command(&self) -> Option<Command> {
        match self.category {
            Category::Command => Some(Command::from_code(self.code)),
            _ => None,
        }
    }
}
