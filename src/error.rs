use core::fmt;

/// Errors returned by a [`Session`](crate::Session).
///
/// Line noise never shows up here: rejected frames and overwritten queue
/// bytes are absorbed and only counted in [`LineStats`](crate::LineStats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The output pin reported an error.
    Bus(E),
    /// The configuration does not allow the requested operation.
    Configuration(ConfigError),
    /// The operation is not allowed in the current run state.
    State(StateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No receive pin has been assigned.
    RxPinUnset,
    /// No transmit pin has been assigned.
    TxPinUnset,
    /// Baud rate outside `1..=MAX_BAUD`.
    BaudOutOfRange(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `start()` on a session that is already running.
    AlreadyRunning,
    /// Reconfiguration attempted while running.
    Running,
}

impl<E> From<ConfigError> for Error<E> {
    fn from(e: ConfigError) -> Self {
        Error::Configuration(e)
    }
}

impl<E> From<StateError> for Error<E> {
    fn from(e: StateError) -> Self {
        Error::State(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::RxPinUnset => f.write_str("rx pin not assigned"),
            ConfigError::TxPinUnset => f.write_str("tx pin not assigned"),
            ConfigError::BaudOutOfRange(baud) => write!(f, "baud rate {} out of range", baud),
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::AlreadyRunning => f.write_str("session already running"),
            StateError::Running => f.write_str("session must be stopped to reconfigure"),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "output pin error: {:?}", e),
            Error::Configuration(e) => write!(f, "configuration error: {}", e),
            Error::State(e) => write!(f, "state error: {}", e),
        }
    }
}
