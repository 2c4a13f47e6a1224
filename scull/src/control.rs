//! Control channel: get/set of store geometry and pipe size
//!
//! Command letters follow the classic convention:
//! - **S**et: the new value is read through `arg`
//! - **T**ell: `arg` is the new value
//! - **G**et: the current value is written through `arg`
//! - **Q**uery: the current value is the return value
//! - e**X**change: Set and Get in one step, through `arg`
//! - s**H**ift: Tell and Query in one step
//!
//! Changing a store's geometry takes effect at its next growth, i.e. after
//! the next trim; a chain already allocated keeps its frozen geometry.

use crate::caller::Caller;
use crate::error::{Result, ScullError};
use crate::pipe::Pipe;
use crate::store::Store;

/// Magic number shared by every command code
pub const IOC_MAGIC: u8 = b'k';

/// Highest command number
pub const IOC_MAXNR: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    SetQuantum,
    SetQset,
    TellQuantum,
    TellQset,
    GetQuantum,
    GetQset,
    QueryQuantum,
    QueryQset,
    ExchangeQuantum,
    ExchangeQset,
    ShiftQuantum,
    ShiftQset,
    TellPipeSize,
    QueryPipeSize,
}

const COMMANDS: [Command; 15] = [
    Command::Reset,
    Command::SetQuantum,
    Command::SetQset,
    Command::TellQuantum,
    Command::TellQset,
    Command::GetQuantum,
    Command::GetQset,
    Command::QueryQuantum,
    Command::QueryQset,
    Command::ExchangeQuantum,
    Command::ExchangeQset,
    Command::ShiftQuantum,
    Command::ShiftQset,
    Command::TellPipeSize,
    Command::QueryPipeSize,
];

impl Command {
    /// Command number (0..=`IOC_MAXNR`)
    #[must_use]
    pub fn number(self) -> u32 {
        self as u32
    }

    /// Full code: magic in the high byte, number in the low byte
    #[must_use]
    pub fn code(self) -> u32 {
        (u32::from(IOC_MAGIC) << 8) | self.number()
    }

    /// # Errors
    ///
    /// `UnknownCommand` if the magic does not match or the number is out of range.
    pub fn decode(code: u32) -> Result<Self> {
        if code >> 8 != u32::from(IOC_MAGIC) {
            return Err(ScullError::UnknownCommand(code));
        }
        let number = code & 0xff;
        if number > IOC_MAXNR {
            return Err(ScullError::UnknownCommand(code));
        }
        usize::try_from(number)
            .ok()
            .and_then(|i| COMMANDS.get(i).copied())
            .ok_or(ScullError::UnknownCommand(code))
    }

    /// Whether the command changes configuration and needs privilege
    #[must_use]
    pub fn needs_privilege(self) -> bool {
        matches!(
            self,
            Self::SetQuantum
                | Self::SetQset
                | Self::TellQuantum
                | Self::TellQset
                | Self::ExchangeQuantum
                | Self::ExchangeQset
                | Self::ShiftQuantum
                | Self::ShiftQset
                | Self::TellPipeSize
        )
    }
}

fn check_privilege(cmd: Command, caller: &Caller) -> Result<()> {
    if cmd.needs_privilege() && !caller.privileged {
        log::warn!("control: {cmd:?} refused for unprivileged {:?}", caller.uid);
        return Err(ScullError::PermissionDenied);
    }
    Ok(())
}

fn to_size(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| ScullError::invalid(format!("negative size {value}")))
}

fn to_arg(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Apply a store command. `arg` is both the by-value argument and the
/// "pointer" for Set/Get/Exchange. Returns the Query/Shift result, else 0.
///
/// # Errors
///
/// - `PermissionDenied` for a configuration change by an unprivileged caller
/// - `InvalidArgument` for a negative size
/// - `UnknownCommand` for pipe-only commands
pub fn store_control(store: &Store, cmd: Command, arg: &mut i64, caller: &Caller) -> Result<i64> {
    check_privilege(cmd, caller)?;
    log::debug!("control: {} {cmd:?} arg={arg}", store.name());

    match cmd {
        Command::Reset => {
            store.set_quantum(0);
            store.set_qset(0);
            Ok(0)
        }
        Command::SetQuantum | Command::TellQuantum => {
            store.set_quantum(to_size(*arg)?);
            Ok(0)
        }
        Command::SetQset | Command::TellQset => {
            store.set_qset(to_size(*arg)?);
            Ok(0)
        }
        Command::GetQuantum => {
            *arg = to_arg(store.quantum());
            Ok(0)
        }
        Command::GetQset => {
            *arg = to_arg(store.qset());
            Ok(0)
        }
        Command::QueryQuantum => Ok(to_arg(store.quantum())),
        Command::QueryQset => Ok(to_arg(store.qset())),
        Command::ExchangeQuantum => {
            let old = store.set_quantum(to_size(*arg)?);
            *arg = to_arg(old);
            Ok(0)
        }
        Command::ExchangeQset => {
            let old = store.set_qset(to_size(*arg)?);
            *arg = to_arg(old);
            Ok(0)
        }
        Command::ShiftQuantum => Ok(to_arg(store.set_quantum(to_size(*arg)?))),
        Command::ShiftQset => Ok(to_arg(store.set_qset(to_size(*arg)?))),
        Command::TellPipeSize | Command::QueryPipeSize => Err(ScullError::UnknownCommand(cmd.code())),
    }
}

/// Apply a pipe command; only the pipe-size pair is meaningful here.
///
/// # Errors
///
/// - `PermissionDenied` for `TellPipeSize` by an unprivileged caller
/// - `InvalidArgument` for a size below 2
/// - `UnknownCommand` for store commands
pub fn pipe_control(pipe: &Pipe, cmd: Command, arg: i64, caller: &Caller) -> Result<i64> {
    check_privilege(cmd, caller)?;
    match cmd {
        Command::TellPipeSize => {
            pipe.set_buffer_size(to_size(arg)?)?;
            Ok(0)
        }
        Command::QueryPipeSize => Ok(to_arg(pipe.buffer_size())),
        _ => Err(ScullError::UnknownCommand(cmd.code())),
    }
}

impl Store {
    /// See [`store_control`]
    ///
    /// # Errors
    ///
    /// As [`store_control`].
    pub fn control(&self, cmd: Command, arg: &mut i64, caller: &Caller) -> Result<i64> {
        store_control(self, cmd, arg, caller)
    }
}

impl Pipe {
    /// See [`pipe_control`]
    ///
    /// # Errors
    ///
    /// As [`pipe_control`].
    pub fn control(&self, cmd: Command, arg: i64, caller: &Caller) -> Result<i64> {
        pipe_control(self, cmd, arg, caller)
    }
}
