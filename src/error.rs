use std::fmt::Display;

#[derive(Debug)]
pub enum ApatiteError {
    Config(String),
    Format(String),
    Referential(String),
    Mesher(String),
    Io(String),
}

impl Display for ApatiteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            ApatiteError::Config(v) => ("Config", v),
            ApatiteError::Format(v) => ("Format", v),
            ApatiteError::Referential(v) => ("Referential", v),
            ApatiteError::Mesher(v) => ("Mesher", v),
            ApatiteError::Io(v) => ("I/O", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl From<std::io::Error> for ApatiteError {
    fn from(err: std::io::Error) -> Self {
        ApatiteError::Io(err.to_string())
    }
}
