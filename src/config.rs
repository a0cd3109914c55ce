//! Refresh configuration.
//!
//! Two optional durations, accepted either as a directive block
//!
//! ```text
//! wedos {
//!     interval 1h
//!     timeout 10s
//! }
//! ```
//!
//! or as JSON (`{"interval": "1h", "timeout": "10s"}`, integers are nanoseconds).

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ConfigError;

/// Refresh interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Largest accepted duration (`i64::MAX` nanoseconds, roughly 292 years).
pub const MAX_DURATION: Duration = Duration::from_nanos(i64::MAX as u64);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Time between refresh attempts. Unset or zero means one hour.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub interval: Option<Duration>,

    /// Deadline for a single fetch. Unset or zero means no deadline.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
}

impl RefreshConfig {
    pub fn effective_interval(&self) -> Duration {
        match self.interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => DEFAULT_INTERVAL,
        }
    }

    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Rejects durations the scheduler cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("interval", self.interval), ("timeout", self.timeout)] {
            if let Some(value) = value {
                if value > MAX_DURATION {
                    return Err(ConfigError::InvalidDuration {
                        value: format!("{:?}", value),
                        reason: format!("{} exceeds the maximum duration", name),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a single `name { ... }` directive block.
    pub fn from_block(input: &str) -> Result<Self, ConfigError> {
        let mut dispenser = Dispenser::new(input);
        let mut config = Self::default();
        config.unmarshal_block(&mut dispenser)?;
        if let Some(token) = dispenser.next_token() {
            return Err(ConfigError::UnexpectedToken {
                token: token.text,
                line: token.line,
            });
        }
        Ok(config)
    }

    /// Loads a config file: `.json` files as JSON, anything else as a block.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&input),
            _ => Self::from_block(&input),
        }
    }

    /// Fills this config from the block at the dispenser's position.
    ///
    /// No arguments may follow the module name on its line. Inside the block,
    /// each option takes exactly one argument.
    pub fn unmarshal_block(&mut self, d: &mut Dispenser) -> Result<(), ConfigError> {
        let name = d.next_token().ok_or_else(|| ConfigError::MissingArgument {
            option: "module name".to_string(),
            line: 1,
        })?;

        if let Some(arg) = d.next_arg() {
            return Err(ConfigError::UnexpectedArgument {
                directive: name.text,
                arg: arg.text,
                line: arg.line,
            });
        }

        if !d.open_block(name.line) {
            return Ok(());
        }

        loop {
            let option = match d.next_token() {
                Some(token) if token.text == "}" => break,
                Some(token) if token.text == "{" => {
                    return Err(ConfigError::UnexpectedToken {
                        token: token.text,
                        line: token.line,
                    })
                }
                Some(token) => token,
                None => {
                    return Err(ConfigError::UnexpectedToken {
                        token: "end of input".to_string(),
                        line: d.last_line(),
                    })
                }
            };

            let value = d.next_arg().ok_or_else(|| ConfigError::MissingArgument {
                option: option.text.clone(),
                line: option.line,
            })?;
            if let Some(extra) = d.next_arg() {
                return Err(ConfigError::ExtraArgument {
                    option: option.text,
                    arg: extra.text,
                    line: extra.line,
                });
            }

            match option.text.as_str() {
                "interval" => self.interval = Some(parse_duration(&value.text)?),
                "timeout" => self.timeout = Some(parse_duration(&value.text)?),
                _ => {
                    return Err(ConfigError::UnknownOption {
                        option: option.text,
                        line: option.line,
                    })
                }
            }
        }

        self.validate()
    }
}

/// A token of a directive block and the line it appeared on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: usize,
}

/// Cursor over the whitespace-separated tokens of a directive block.
///
/// `#` starts a comment that runs to the end of the line. Braces must stand
/// alone as tokens. A token wrapped in double quotes is unquoted; quoted
/// tokens cannot contain whitespace.
#[derive(Debug, Clone)]
pub struct Dispenser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Dispenser {
    pub fn new(input: &str) -> Self {
        let mut tokens = Vec::new();
        for (idx, line) in input.lines().enumerate() {
            for word in line.split_whitespace() {
                if word.starts_with('#') {
                    break;
                }
                tokens.push(Token {
                    text: unquote(word).to_string(),
                    line: idx + 1,
                });
            }
        }
        Self { tokens, pos: 0 }
    }

    /// Advances to the next token on any line.
    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Advances only if the next token is an argument on the current line.
    pub fn next_arg(&mut self) -> Option<Token> {
        let line = self.current_line()?;
        match self.tokens.get(self.pos) {
            Some(token) if token.line == line && token.text != "{" && token.text != "}" => {
                self.next_token()
            }
            _ => None,
        }
    }

    /// Consumes a `{` that ends `line`, if there is one.
    fn open_block(&mut self, line: usize) -> bool {
        match self.tokens.get(self.pos) {
            Some(token) if token.line == line && token.text == "{" => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn current_line(&self) -> Option<usize> {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map(|token| token.line)
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|token| token.line).unwrap_or(1)
    }
}

fn unquote(word: &str) -> &str {
    word.strip_prefix('"')
        .and_then(|w| w.strip_suffix('"'))
        .unwrap_or(word)
}

fn duration_segment() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h|d)").expect("valid duration regex")
    })
}

/// Parses a duration such as `1h`, `90s`, `1h30m`, `1.5h`, `250ms` or `2d`.
///
/// A bare `0` is accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let body = input.strip_prefix('+').unwrap_or(input);
    if body.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }
    if body == "0" {
        return Ok(Duration::ZERO);
    }
    if body.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut pos = 0;
    let mut total_nanos = 0f64;
    for caps in duration_segment().captures_iter(body) {
        let whole = caps.get(0).ok_or_else(|| invalid("malformed segment"))?;
        if whole.start() != pos {
            return Err(invalid("unexpected characters"));
        }
        pos = whole.end();

        let value: f64 = caps[1].parse().map_err(|_| invalid("bad number"))?;
        let unit_nanos = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "d" => 86_400e9,
            _ => return Err(invalid("unknown unit")),
        };
        total_nanos += value * unit_nanos;
    }

    if pos == 0 {
        return Err(invalid("missing unit"));
    }
    if pos != body.len() {
        return Err(invalid("unexpected characters"));
    }
    if total_nanos.round() > i64::MAX as f64 {
        return Err(invalid("duration out of range"));
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Nanos(i64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Nanos(n)) if n < 0 => {
            Err(D::Error::custom("negative durations are not allowed"))
        }
        Some(RawDuration::Nanos(n)) => Ok(Some(Duration::from_nanos(n as u64))),
        Some(RawDuration::Text(text)) => parse_duration(&text).map(Some).map_err(D::Error::custom),
    }
}
