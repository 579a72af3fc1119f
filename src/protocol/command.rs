//! Gearman Command Vocabulary
//!
//! Commands travel as a numeric type code. [`CommandCode`] is that raw code
//! exactly as a frame decoder produced it; [`CommandType`] is the closed set
//! of codes the protocol actually defines.
//!
//! ## Naming
//!
//! Every command has a canonical name in the `GEARMAN_COMMAND_` namespace,
//! e.g. `GEARMAN_COMMAND_ECHO_RES`. Handler callbacks are named by stripping
//! the namespace, lowercasing, and prefixing `recv_`:
//!
//! ```text
//! GEARMAN_COMMAND_ECHO_RES  ──>  ECHO_RES  ──>  recv_echo_res
//! ```

use std::fmt;

/// Prefix shared by the canonical names of all protocol commands.
pub const COMMAND_NAMESPACE: &str = "GEARMAN_COMMAND_";

/// Prefix of the callback a handler registers for a command.
pub const CALLBACK_PREFIX: &str = "recv_";

/// A raw command type code as decoded from the wire.
///
/// Codes outside [`CommandType`] are representable so that a decoder can hand
/// them to a handler, which then rejects them as unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandCode(pub u32);

impl CommandCode {
    /// Returns the protocol command this code names, if any.
    pub fn command_type(self) -> Option<CommandType> {
        CommandType::from_code(self)
    }

    /// Returns the canonical `GEARMAN_COMMAND_*` name, if the code is known.
    pub fn canonical_name(self) -> Option<String> {
        self.command_type().map(CommandType::canonical_name)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command_type() {
            Some(command) => write!(f, "{} ({})", command, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<CommandType> for CommandCode {
    fn from(command: CommandType) -> Self {
        command.code()
    }
}

macro_rules! gearman_commands {
    ($($(#[$meta:meta])* $variant:ident = $code:literal => $name:literal,)*) => {
        /// Every command type defined by the Gearman protocol.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum CommandType {
            $($(#[$meta])* $variant,)*
        }

        impl CommandType {
            /// All command types, in code order.
            pub const ALL: &'static [CommandType] = &[$(CommandType::$variant,)*];

            /// Returns the numeric type code.
            pub const fn code(self) -> CommandCode {
                match self {
                    $(CommandType::$variant => CommandCode($code),)*
                }
            }

            /// Looks up the command type for a raw code.
            pub const fn from_code(code: CommandCode) -> Option<Self> {
                match code.0 {
                    $($code => Some(CommandType::$variant),)*
                    _ => None,
                }
            }

            /// Returns the name without the `GEARMAN_COMMAND_` namespace.
            pub const fn name(self) -> &'static str {
                match self {
                    $(CommandType::$variant => $name,)*
                }
            }
        }
    };
}

gearman_commands! {
    CanDo = 1 => "CAN_DO",
    CantDo = 2 => "CANT_DO",
    ResetAbilities = 3 => "RESET_ABILITIES",
    PreSleep = 4 => "PRE_SLEEP",
    Noop = 6 => "NOOP",
    SubmitJob = 7 => "SUBMIT_JOB",
    JobCreated = 8 => "JOB_CREATED",
    GrabJob = 9 => "GRAB_JOB",
    NoJob = 10 => "NO_JOB",
    JobAssign = 11 => "JOB_ASSIGN",
    WorkStatus = 12 => "WORK_STATUS",
    WorkComplete = 13 => "WORK_COMPLETE",
    WorkFail = 14 => "WORK_FAIL",
    GetStatus = 15 => "GET_STATUS",
    EchoReq = 16 => "ECHO_REQ",
    EchoRes = 17 => "ECHO_RES",
    SubmitJobBg = 18 => "SUBMIT_JOB_BG",
    /// Server-reported error; every handler understands this one.
    Error = 19 => "ERROR",
    StatusRes = 20 => "STATUS_RES",
    SubmitJobHigh = 21 => "SUBMIT_JOB_HIGH",
    SetClientId = 22 => "SET_CLIENT_ID",
    CanDoTimeout = 23 => "CAN_DO_TIMEOUT",
    AllYours = 24 => "ALL_YOURS",
    WorkException = 25 => "WORK_EXCEPTION",
    OptionReq = 26 => "OPTION_REQ",
    OptionRes = 27 => "OPTION_RES",
    WorkData = 28 => "WORK_DATA",
    WorkWarning = 29 => "WORK_WARNING",
    GrabJobUniq = 30 => "GRAB_JOB_UNIQ",
    JobAssignUniq = 31 => "JOB_ASSIGN_UNIQ",
    SubmitJobHighBg = 32 => "SUBMIT_JOB_HIGH_BG",
    SubmitJobLow = 33 => "SUBMIT_JOB_LOW",
    SubmitJobLowBg = 34 => "SUBMIT_JOB_LOW_BG",
    SubmitJobSched = 35 => "SUBMIT_JOB_SCHED",
    SubmitJobEpoch = 36 => "SUBMIT_JOB_EPOCH",
    /// Plain-text administrative protocol line.
    TextCommand = 9999 => "TEXT_COMMAND",
}

impl CommandType {
    /// Returns the canonical name, e.g. `GEARMAN_COMMAND_ECHO_REQ`.
    pub fn canonical_name(self) -> String {
        format!("{}{}", COMMAND_NAMESPACE, self.name())
    }

    /// Returns the name of the handler callback for this command, e.g.
    /// `recv_echo_req`.
    pub fn callback_name(self) -> String {
        let canonical = self.canonical_name();
        let bare = canonical
            .strip_prefix(COMMAND_NAMESPACE)
            .unwrap_or(canonical.as_str());
        format!("{}{}", CALLBACK_PREFIX, bare.to_ascii_lowercase())
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COMMAND_NAMESPACE, self.name())
    }
}
