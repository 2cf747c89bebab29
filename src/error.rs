use thiserror::Error;

/// Problems with user input, shown inline where the action happened.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("\"{name}\" is not an image (type: {declared})")]
    UnsupportedType { name: String, declared: String },
    #[error("could not read \"{name}\": {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode \"{name}\": {source}")]
    Undecodable {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("draw at least one box before generating")]
    NoAnnotations,
}

/// Failures of the edit service round trip, shown as a global notice.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("no API key configured (set GEMINI_API_KEY)")]
    MissingCredential,
    #[error("could not encode request image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("edit service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("edit service returned no image")]
    EmptyResponse,
    #[error("edit service returned unreadable image data: {0}")]
    InvalidImage(String),
    #[error("edit worker stopped before replying")]
    WorkerLost,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("bundled note font is invalid")]
    Font(#[from] ab_glyph::InvalidFont),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Where an error is presented to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    Inline,
    Notice,
}

impl AppError {
    pub fn surface(&self) -> Surface {
        match self {
            AppError::Validation(_) => Surface::Inline,
            AppError::Remote(_) => Surface::Notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_route_to_their_surface() {
        let local: AppError = ValidationError::NoAnnotations.into();
        let remote: AppError = RemoteError::EmptyResponse.into();
        assert_eq!(local.surface(), Surface::Inline);
        assert_eq!(remote.surface(), Surface::Notice);
        assert_eq!(remote.to_string(), "edit service returned no image");
    }
}
