mod error;

pub(crate) use error::Error;
