/// All errors that can occur within stoat.
///
/// One enum across the workspace: loader preconditions, partition
/// feasibility, and backend (kernel compile/dispatch) failures. Every
/// precondition is checked before any shared state is mutated, so a failed
/// call leaves the loader as it was.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `validation_ratio` outside the allowed range. The ratio must be a
    /// finite value `< 1`; values `<= 0` dissolve the validation set.
    #[error("validation_ratio = {0} is out of the allowed range (must be a finite value < 1)")]
    InvalidRatio(f64),

    /// Sample shape queried before any sample has been loaded.
    #[error("sample shape is unknown until data has been loaded")]
    ShapeNotReady,

    /// The label sequence does not match the sample count.
    #[error("labels and samples must have the same length ({labels} vs {samples})")]
    LabelCountMismatch { labels: usize, samples: usize },

    /// A stratified resize would remove an entire class from the train set.
    #[error(
        "too few samples of class {label}: validation quota {quota} \
         is not below the {available} available"
    )]
    InsufficientClass {
        label: i32,
        quota: usize,
        available: usize,
    },

    /// Kernel compile, dispatch, or device transfer failure. Fatal to the
    /// current call; never retried and never downgraded to the host path.
    #[error("backend: {0}")]
    Backend(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Create a backend error from any string message.
    pub fn backend(s: impl Into<String>) -> Self {
        Error::Backend(s.into())
    }
}

/// Convenience Result type used throughout stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
