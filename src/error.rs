pub type SparkleResult<T> = Result<T, SparkleError>;

#[derive(thiserror::Error, Debug)]
pub enum SparkleError {
    #[error("script error: {0}")]
    Script(String),

    #[error("vm error: {0}")]
    Vm(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SparkleError {
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    pub fn vm(msg: impl Into<String>) -> Self {
        Self::Vm(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// The bare message without the variant prefix, for script diagnostics.
    pub fn message(&self) -> String {
        match self {
            Self::Script(s) | Self::Vm(s) | Self::Codec(s) => s.clone(),
            Self::Other(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SparkleError::script("x")
                .to_string()
                .contains("script error:")
        );
        assert!(SparkleError::vm("x").to_string().contains("vm error:"));
        assert!(SparkleError::codec("x").to_string().contains("codec error:"));
    }

    #[test]
    fn message_strips_prefix() {
        assert_eq!(SparkleError::vm("Invalid frame index").message(), "Invalid frame index");
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SparkleError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
