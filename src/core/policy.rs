// src/core/policy.rs

//! Cluster policies named in connection properties, and the best-effort rules used
//! to turn those names into values.
//!
//! Policy names follow the driver's constructor notation:
//! `TokenAwarePolicy(DCAwareRoundRobinPolicy('dc1'))`,
//! `ExponentialReconnectionPolicy((long)1000, (long)60000)`. A leading package path
//! such as `com.datastax.driver.core.policies.` is accepted and ignored.

use crate::core::errors::SettingParseError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const LOAD_BALANCING_SETTING: &str = "load balancing policy";
pub const RETRY_SETTING: &str = "retry policy";
pub const RECONNECTION_SETTING: &str = "reconnection policy";

/// The outcome of resolving a setting whose parse failure may or may not be fatal.
///
/// With debug mode off a malformed value degrades to a fallback (possibly "nothing",
/// meaning the driver default applies). With debug mode on it is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<T> {
    Parsed(T),
    Fallback {
        value: Option<T>,
        error: SettingParseError,
    },
    Rejected(SettingParseError),
}

impl<T> Setting<T> {
    /// Classifies a parse result according to the debug flag.
    pub fn evaluate(
        parsed: Result<T, SettingParseError>,
        debug: bool,
        fallback: impl FnOnce() -> Option<T>,
    ) -> Self {
        match parsed {
            Ok(value) => Setting::Parsed(value),
            Err(error) if debug => Setting::Rejected(error),
            Err(error) => Setting::Fallback {
                value: fallback(),
                error,
            },
        }
    }

    /// Collapses the outcome, logging a warning when a fallback was used.
    pub fn into_result(self) -> Result<Option<T>, SettingParseError> {
        match self {
            Setting::Parsed(value) => Ok(Some(value)),
            Setting::Fallback { value, error } => {
                if value.is_some() {
                    warn!("{error}; falling back to the default {}", error.setting);
                } else {
                    warn!("{error}; leaving it unset");
                }
                Ok(value)
            }
            Setting::Rejected(error) => Err(error),
        }
    }
}

/// Resolves an optional policy name. An empty name means "not configured".
pub fn resolve_policy<T: FromStr<Err = SettingParseError>>(
    raw: &str,
    debug: bool,
    fallback: impl FnOnce() -> Option<T>,
) -> Result<Option<T>, SettingParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Setting::evaluate(raw.parse::<T>(), debug, fallback).into_result()
}

/// Decides how requests are spread over the cluster's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancingPolicy {
    RoundRobin,
    DcAwareRoundRobin { local_dc: Option<String> },
    TokenAware(Box<LoadBalancingPolicy>),
    LatencyAware(Box<LoadBalancingPolicy>),
}

impl LoadBalancingPolicy {
    /// The policy used when a configured load balancing policy cannot be parsed.
    pub fn token_aware_round_robin() -> Self {
        LoadBalancingPolicy::TokenAware(Box::new(LoadBalancingPolicy::RoundRobin))
    }

    /// Returns true if requests are routed to replicas owning the partition key.
    pub fn is_token_aware(&self) -> bool {
        match self {
            LoadBalancingPolicy::TokenAware(_) => true,
            LoadBalancingPolicy::LatencyAware(child) => child.is_token_aware(),
            _ => false,
        }
    }

    fn from_expr(expr: &PolicyExpr) -> Result<Self, String> {
        let (name, args) = expr.as_call()?;
        match name {
            "RoundRobinPolicy" => {
                expect_arity(name, args, 0)?;
                Ok(LoadBalancingPolicy::RoundRobin)
            }
            "DCAwareRoundRobinPolicy" => match args {
                [] => Ok(LoadBalancingPolicy::DcAwareRoundRobin { local_dc: None }),
                [PolicyExpr::Str(dc)] => Ok(LoadBalancingPolicy::DcAwareRoundRobin {
                    local_dc: Some(dc.clone()),
                }),
                _ => Err(format!("{name} takes an optional local datacenter name")),
            },
            "TokenAwarePolicy" => Ok(LoadBalancingPolicy::TokenAware(Box::new(
                Self::from_expr(single_arg(name, args)?)?,
            ))),
            "LatencyAwarePolicy" => Ok(LoadBalancingPolicy::LatencyAware(Box::new(
                Self::from_expr(single_arg(name, args)?)?,
            ))),
            other => Err(format!("unknown load balancing policy '{other}'")),
        }
    }
}

impl FromStr for LoadBalancingPolicy {
    type Err = SettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyExpr::parse(s)
            .and_then(|expr| Self::from_expr(&expr))
            .map_err(|reason| SettingParseError::new(LOAD_BALANCING_SETTING, s, reason))
    }
}

impl fmt::Display for LoadBalancingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancingPolicy::RoundRobin => write!(f, "RoundRobinPolicy()"),
            LoadBalancingPolicy::DcAwareRoundRobin { local_dc: None } => {
                write!(f, "DCAwareRoundRobinPolicy()")
            }
            LoadBalancingPolicy::DcAwareRoundRobin { local_dc: Some(dc) } => {
                write!(f, "DCAwareRoundRobinPolicy('{dc}')")
            }
            LoadBalancingPolicy::TokenAware(child) => write!(f, "TokenAwarePolicy({child})"),
            LoadBalancingPolicy::LatencyAware(child) => write!(f, "LatencyAwarePolicy({child})"),
        }
    }
}

/// Decides whether a failed request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    Default,
    DowngradingConsistency,
    Fallthrough,
    Logging(Box<RetryPolicy>),
}

impl RetryPolicy {
    fn from_expr(expr: &PolicyExpr) -> Result<Self, String> {
        let (name, args) = expr.as_call()?;
        match name {
            "DefaultRetryPolicy" => expect_arity(name, args, 0).map(|_| RetryPolicy::Default),
            "DowngradingConsistencyRetryPolicy" => {
                expect_arity(name, args, 0).map(|_| RetryPolicy::DowngradingConsistency)
            }
            "FallthroughRetryPolicy" => {
                expect_arity(name, args, 0).map(|_| RetryPolicy::Fallthrough)
            }
            "LoggingRetryPolicy" => Ok(RetryPolicy::Logging(Box::new(Self::from_expr(
                single_arg(name, args)?,
            )?))),
            other => Err(format!("unknown retry policy '{other}'")),
        }
    }
}

impl FromStr for RetryPolicy {
    type Err = SettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyExpr::parse(s)
            .and_then(|expr| Self::from_expr(&expr))
            .map_err(|reason| SettingParseError::new(RETRY_SETTING, s, reason))
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::Default => write!(f, "DefaultRetryPolicy()"),
            RetryPolicy::DowngradingConsistency => write!(f, "DowngradingConsistencyRetryPolicy()"),
            RetryPolicy::Fallthrough => write!(f, "FallthroughRetryPolicy()"),
            RetryPolicy::Logging(child) => write!(f, "LoggingRetryPolicy({child})"),
        }
    }
}

/// Decides how long to wait before reconnecting to a node that went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionPolicy {
    Constant { delay: Duration },
    Exponential { base: Duration, max: Duration },
}

impl ReconnectionPolicy {
    /// The delay before reconnection attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectionPolicy::Constant { delay } => delay,
            ReconnectionPolicy::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                base.checked_mul(factor).map_or(max, |d| d.min(max))
            }
        }
    }

    fn from_expr(expr: &PolicyExpr) -> Result<Self, String> {
        let (name, args) = expr.as_call()?;
        match (name, args) {
            ("ConstantReconnectionPolicy", [delay]) => Ok(ReconnectionPolicy::Constant {
                delay: Duration::from_millis(delay.as_millis()?),
            }),
            ("ExponentialReconnectionPolicy", [base, max]) => {
                let (base, max) = (base.as_millis()?, max.as_millis()?);
                if base == 0 {
                    return Err("base delay must be strictly positive".to_string());
                }
                if max < base {
                    return Err(format!("max delay {max} is lower than base delay {base}"));
                }
                Ok(ReconnectionPolicy::Exponential {
                    base: Duration::from_millis(base),
                    max: Duration::from_millis(max),
                })
            }
            ("ConstantReconnectionPolicy", _) => Err(format!("{name} takes a delay in ms")),
            ("ExponentialReconnectionPolicy", _) => {
                Err(format!("{name} takes a base and a max delay in ms"))
            }
            (other, _) => Err(format!("unknown reconnection policy '{other}'")),
        }
    }
}

impl FromStr for ReconnectionPolicy {
    type Err = SettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyExpr::parse(s)
            .and_then(|expr| Self::from_expr(&expr))
            .map_err(|reason| SettingParseError::new(RECONNECTION_SETTING, s, reason))
    }
}

impl fmt::Display for ReconnectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectionPolicy::Constant { delay } => {
                write!(f, "ConstantReconnectionPolicy((long){})", delay.as_millis())
            }
            ReconnectionPolicy::Exponential { base, max } => write!(
                f,
                "ExponentialReconnectionPolicy((long){},(long){})",
                base.as_millis(),
                max.as_millis()
            ),
        }
    }
}

fn expect_arity(name: &str, args: &[PolicyExpr], arity: usize) -> Result<(), String> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(format!("{name} expects {arity} argument(s), got {}", args.len()))
    }
}

fn single_arg<'a>(name: &str, args: &'a [PolicyExpr]) -> Result<&'a PolicyExpr, String> {
    match args {
        [child] => Ok(child),
        _ => Err(format!("{name} wraps exactly one child policy")),
    }
}

/// A parsed constructor expression.
#[derive(Debug, Clone, PartialEq)]
enum PolicyExpr {
    Call { name: String, args: Vec<PolicyExpr> },
    Str(String),
    Int(i64),
}

impl PolicyExpr {
    fn parse(input: &str) -> Result<Self, String> {
        let mut parser = ExprParser {
            src: input.as_bytes(),
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        parser.skip_ws();
        if parser.pos != parser.src.len() {
            return Err(format!("unexpected trailing input at offset {}", parser.pos));
        }
        Ok(expr)
    }

    fn as_call(&self) -> Result<(&str, &[PolicyExpr]), String> {
        match self {
            PolicyExpr::Call { name, args } => Ok((name.as_str(), args.as_slice())),
            other => Err(format!("expected a policy, found {other:?}")),
        }
    }

    fn as_millis(&self) -> Result<u64, String> {
        match self {
            PolicyExpr::Int(n) => u64::try_from(*n).map_err(|_| format!("delay {n} is negative")),
            other => Err(format!("expected a delay in ms, found {other:?}")),
        }
    }
}

/// Deepest nesting of policy expressions accepted by the parser.
const MAX_NESTING: usize = 32;

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(format!(
                "expected '{}' at offset {}, found '{}'",
                expected as char, self.pos, b as char
            )),
            None => Err(format!("expected '{}' but input ended", expected as char)),
        }
    }

    fn expr(&mut self) -> Result<PolicyExpr, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("policy nesting too deep (limit {MAX_NESTING})"));
        }
        self.depth += 1;
        let expr = self.term();
        self.depth -= 1;
        expr
    }

    fn term(&mut self) -> Result<PolicyExpr, String> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ (b'\'' | b'"')) => self.string(quote),
            // A Java-style cast such as `(long)1000`.
            Some(b'(') => {
                self.pos += 1;
                self.ident()?;
                self.eat(b')')?;
                self.skip_ws();
                self.int()
            }
            Some(b) if b.is_ascii_digit() || b == b'-' => self.int(),
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.call(),
            Some(b) => Err(format!("unexpected '{}' at offset {}", b as char, self.pos)),
            None => Err("empty policy expression".to_string()),
        }
    }

    fn ident(&mut self) -> Result<&str, String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected an identifier at offset {start}"));
        }
        std::str::from_utf8(&self.src[start..self.pos]).map_err(|e| e.to_string())
    }

    fn call(&mut self) -> Result<PolicyExpr, String> {
        let qualified = self.ident()?;
        let name = qualified.rsplit('.').next().unwrap_or(qualified).to_string();
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            self.skip_ws();
            if self.peek() == Some(b')') {
                self.pos += 1;
            } else {
                loop {
                    args.push(self.expr()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return Err(format!("unterminated argument list for {name}")),
                    }
                }
            }
        }
        Ok(PolicyExpr::Call { name, args })
    }

    fn string(&mut self, quote: u8) -> Result<PolicyExpr, String> {
        let start = self.pos + 1;
        let len = self.src[start..]
            .iter()
            .position(|&b| b == quote)
            .ok_or_else(|| "unterminated string literal".to_string())?;
        self.pos = start + len + 1;
        let value = std::str::from_utf8(&self.src[start..start + len]).map_err(|e| e.to_string())?;
        Ok(PolicyExpr::Str(value.to_string()))
    }

    fn int(&mut self) -> Result<PolicyExpr, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        // Tolerate Java long literals such as `1000L`.
        let end = self.pos;
        if matches!(self.peek(), Some(b'L' | b'l')) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..end])
            .ok()
            .and_then(|digits| digits.parse::<i64>().ok())
            .map(PolicyExpr::Int)
            .ok_or_else(|| format!("invalid integer at offset {start}"))
    }
}
