use crate::extraction_types::ExtractionTypes;

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// The requested types select no primitive kind or no category.
    NothingToExtract(ExtractionTypes),
    Io(io::Error),
    Decode(prost::DecodeError),
    InvalidData(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NothingToExtract(types) => {
                write!(f, "nothing to extract for extraction types '{}'", types)
            }
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Decode(e) => write!(f, "failed to decode pbf block: {}", e),
            Error::InvalidData(msg) => write!(f, "invalid pbf data: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() != io::ErrorKind::InvalidData {
            return Error::Io(e);
        }
        let decode_error = e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<prost::DecodeError>())
            .cloned();
        match decode_error {
            Some(decode_error) => Error::Decode(decode_error),
            None => Error::InvalidData(e.to_string()),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Decode(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use prost::Message;

    #[test]
    fn test_from_io_error() {
        let decode_error = crate::osmpbf::proto::Blob::decode(&[0xff, 0xff][..]).unwrap_err();
        let err: Error = io::Error::from(decode_error).into();
        assert!(matches!(err, Error::Decode(_)));

        let err: Error = io::Error::new(io::ErrorKind::InvalidData, "negative blob size").into();
        assert!(matches!(err, Error::InvalidData(ref msg) if msg == "negative blob size"));

        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::NothingToExtract(ExtractionTypes::WAYS);
        assert_eq!(err.to_string(), "nothing to extract for extraction types 'ways'");
    }
}
