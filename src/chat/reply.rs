/// Protocol reply serialization.
///
/// Every line the server writes has the shape
///   `<3-digit-code> <CATEGORY> <TOKEN> [args...]`
/// where the category is `OK`, `ERROR`, or `INFO`. Lines are terminated
/// by `\n` on the wire; serialization here omits the terminator.
use std::fmt;

/// Reply category — the second field of every reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Ok,
    Error,
    Info,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Info => "INFO",
        }
    }
}

/// A single reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status code (e.g. 200, 403).
    pub code: u16,
    pub category: Category,
    /// The machine-readable token (e.g. `REGISTERED`, `NOT_IN_GROUP`).
    pub token: String,
    /// Remaining arguments, space-joined on the wire.
    pub args: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, category: Category, token: impl Into<String>) -> Self {
        Self {
            code,
            category,
            token: token.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn not_registered() -> Self {
        Self::new(403, Category::Error, "NOT_REGISTERED")
    }

    pub fn invalid_format() -> Self {
        Self::new(400, Category::Error, "INVALID_COMMAND_FORMAT")
    }

    pub fn unknown_command() -> Self {
        Self::new(400, Category::Error, "UNKNOWN_COMMAND")
    }

    /// Serialize to the wire format (without the trailing `\n`).
    pub fn to_wire(&self) -> String {
        let mut out = format!("{} {} {}", self.code, self.category.as_str(), self.token);
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
