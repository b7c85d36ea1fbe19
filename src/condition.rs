//! Conditions guarding JVM options
//!
//! Text form:
//!
//! ```text
//! true
//! os(windows)
//! arch(aarch64)
//! java(17)                      # runtime feature version >= 17
//! not(os(windows))
//! all(os(linux), arch(x86_64))
//! any(os(macos), java(21))
//! ```

use crate::{PackError, PackResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// What a launching machine looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    /// Normalized operating system name (`windows`, `linux`, `macos`, ...)
    pub os: String,
    /// Normalized architecture name (`x86_64`, `aarch64`, `x86`, ...)
    pub arch: String,
    /// Java feature version of the runtime, if known
    pub java_version: Option<u32>,
}

impl RuntimeContext {
    /// Context of the current process
    pub fn current(java_version: Option<u32>) -> Self {
        Self {
            os: normalize_os(std::env::consts::OS),
            arch: normalize_arch(std::env::consts::ARCH),
            java_version,
        }
    }
}

/// Canonical operating system name
pub fn normalize_os(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "win" | "windows" | "win32" | "win64" => "windows".to_string(),
        "mac" | "macos" | "osx" | "darwin" | "macosx" => "macos".to_string(),
        other => other.to_string(),
    }
}

/// Canonical architecture name
pub fn normalize_arch(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "amd64" | "x64" | "x86-64" | "x86_64" => "x86_64".to_string(),
        "arm64" | "aarch64" => "aarch64".to_string(),
        "i386" | "i486" | "i586" | "i686" | "x86" => "x86".to_string(),
        other => other.to_string(),
    }
}

/// Boolean test over a [`RuntimeContext`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Always holds
    True,
    /// Negation
    Not(Box<Condition>),
    /// Every sub-condition holds
    All(Vec<Condition>),
    /// At least one sub-condition holds
    Any(Vec<Condition>),
    /// Operating system matches
    Os(String),
    /// Architecture matches
    Arch(String),
    /// Java feature version is at least this
    Java(u32),
}

impl Condition {
    /// Evaluate against a runtime
    pub fn test(&self, context: &RuntimeContext) -> bool {
        match self {
            Condition::True => true,
            Condition::Not(inner) => !inner.test(context),
            Condition::All(items) => items.iter().all(|c| c.test(context)),
            Condition::Any(items) => items.iter().any(|c| c.test(context)),
            Condition::Os(os) => normalize_os(os) == context.os,
            Condition::Arch(arch) => normalize_arch(arch) == context.arch,
            Condition::Java(min) => context.java_version.is_some_and(|v| v >= *min),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, items: &[Condition]) -> fmt::Result {
            write!(f, "{}(", name)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", item)?;
            }
            f.write_str(")")
        }

        match self {
            Condition::True => f.write_str("true"),
            Condition::Not(inner) => write!(f, "not({})", inner),
            Condition::All(items) => list(f, "all", items),
            Condition::Any(items) => list(f, "any", items),
            Condition::Os(os) => write!(f, "os({})", os),
            Condition::Arch(arch) => write!(f, "arch({})", arch),
            Condition::Java(v) => write!(f, "java({})", v),
        }
    }
}

impl FromStr for Condition {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s, pos: 0 };
        let condition = parser.condition()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(condition)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> PackError {
        PackError::InvalidCondition(format!("{} at {} in '{}'", msg, self.pos, self.input))
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.input[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> PackResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn word(&mut self) -> PackResult<&'a str> {
        self.skip_ws();
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&input[start..self.pos])
    }

    fn condition(&mut self) -> PackResult<Condition> {
        let name = self.word()?.to_ascii_lowercase();
        if name == "true" {
            return Ok(Condition::True);
        }

        self.expect('(')?;
        let condition = match name.as_str() {
            "not" => Condition::Not(Box::new(self.condition()?)),
            "all" | "and" => Condition::All(self.condition_list()?),
            "any" | "or" => Condition::Any(self.condition_list()?),
            "os" => Condition::Os(self.word()?.to_string()),
            "arch" => Condition::Arch(self.word()?.to_string()),
            "java" => {
                let word = self.word()?;
                let version = word
                    .parse::<u32>()
                    .map_err(|_| self.error(&format!("invalid java version '{}'", word)))?;
                Condition::Java(version)
            }
            other => return Err(self.error(&format!("unknown condition '{}'", other))),
        };
        self.expect(')')?;
        Ok(condition)
    }

    fn condition_list(&mut self) -> PackResult<Vec<Condition>> {
        let mut items = vec![self.condition()?];
        while self.eat(',') {
            items.push(self.condition()?);
        }
        Ok(items)
    }
}
