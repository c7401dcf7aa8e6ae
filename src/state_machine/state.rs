use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use thiserror::Error;

/// Flag set describing where a job is in its lifecycle.
///
/// A job can hold several flags at once (`ACTIVE|EXECUTING`,
/// `ACTIVE|FINISHED`, `ERROR|TIMED_OUT`), so callers test flags independently
/// instead of matching on a single variant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JobState(u8);

impl JobState {
    pub const CREATED: Self = Self(1 << 0);
    pub const ACTIVE: Self = Self(1 << 1);
    pub const EXECUTING: Self = Self(1 << 2);
    pub const PAUSED: Self = Self(1 << 3);
    pub const ABORTED: Self = Self(1 << 4);
    pub const ERROR: Self = Self(1 << 5);
    pub const FINISHED: Self = Self(1 << 6);
    pub const TIMED_OUT: Self = Self(1 << 7);

    const NAMED: [(JobState, &'static str); 8] = [
        (Self::CREATED, "CREATED"),
        (Self::ACTIVE, "ACTIVE"),
        (Self::EXECUTING, "EXECUTING"),
        (Self::PAUSED, "PAUSED"),
        (Self::ABORTED, "ABORTED"),
        (Self::ERROR, "ERROR"),
        (Self::FINISHED, "FINISHED"),
        (Self::TIMED_OUT, "TIMED_OUT"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_active(self) -> bool {
        self.contains(Self::ACTIVE)
    }

    pub const fn is_executing(self) -> bool {
        self.contains(Self::EXECUTING)
    }

    pub const fn is_paused(self) -> bool {
        self.contains(Self::PAUSED)
    }

    pub const fn is_aborted(self) -> bool {
        self.contains(Self::ABORTED)
    }

    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }

    pub const fn is_finished(self) -> bool {
        self.contains(Self::FINISHED)
    }

    pub const fn is_timed_out(self) -> bool {
        self.contains(Self::TIMED_OUT)
    }

    /// The terminal outcome carried by this state, if any.
    pub fn terminal(self) -> Option<Terminal> {
        if self.is_error() {
            Some(Terminal::Error)
        } else if self.is_aborted() {
            Some(Terminal::Aborted)
        } else if self.is_finished() {
            Some(Terminal::Finished)
        } else {
            None
        }
    }

    pub fn is_terminal(self) -> bool {
        self.intersects(Self::TERMINALS)
    }

    const TERMINALS: Self = Self(Self::FINISHED.0 | Self::ERROR.0 | Self::ABORTED.0);
}

impl BitOr for JobState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for JobState {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobState({self})")
    }
}

/// The three ways a job can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Finished,
    Error,
    Aborted,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Finished => write!(f, "FINISHED"),
            Terminal::Error => write!(f, "ERROR"),
            Terminal::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {current}, cannot move to {requested}")]
    Terminal {
        current: JobState,
        requested: JobState,
    },

    #[error("{0} is not a valid job state")]
    Invalid(JobState),
}

/// Validates job state transitions.
pub struct StateMachine;

impl StateMachine {
    /// Check that `next` is a consistent flag combination reachable from
    /// `current`, and return it.
    ///
    /// - Terminal states never revert.
    /// - `FINISHED` excludes `EXECUTING` and `PAUSED`.
    /// - `EXECUTING` and `PAUSED` are mutually exclusive.
    /// - At most one terminal flag is set.
    /// - `TIMED_OUT` only accompanies `ERROR`.
    pub fn transition(current: JobState, next: JobState) -> Result<JobState, TransitionError> {
        if current.is_terminal() {
            return Err(TransitionError::Terminal {
                current,
                requested: next,
            });
        }
        Self::validate(next)?;
        Ok(next)
    }

    fn validate(state: JobState) -> Result<(), TransitionError> {
        let terminal_flags = [JobState::FINISHED, JobState::ERROR, JobState::ABORTED]
            .into_iter()
            .filter(|flag| state.contains(*flag))
            .count();

        let invalid = state.is_empty()
            || terminal_flags > 1
            || (state.is_finished() && (state.is_executing() || state.is_paused()))
            || (state.is_executing() && state.is_paused())
            || (state.is_timed_out() && !state.is_error());

        if invalid {
            Err(TransitionError::Invalid(state))
        } else {
            Ok(())
        }
    }
}
