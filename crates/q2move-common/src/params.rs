// params.rs -- world-tunable movement parameters
//
// The server publishes its air acceleration in a config string; clients
// parse it back before predicting, so both sides run with the same value.

use thiserror::Error;

/// Config string slot carrying the air acceleration value.
pub const CS_AIRACCEL: usize = 29;

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("empty air acceleration config string")]
    Empty,
    #[error("invalid air acceleration value '{value}'")]
    InvalidNumber { value: String },
}

/// Parameters that may differ between servers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PmoveParams {
    /// 0 gives the classic ground-acceleration-while-airborne behaviour;
    /// anything else enables air control through `air_accelerate`.
    pub airaccelerate: f32,
}

impl PmoveParams {
    pub fn new(airaccelerate: f32) -> Self {
        Self { airaccelerate }
    }

    /// Strict parse of the `CS_AIRACCEL` config string.
    pub fn parse(s: &str) -> Result<Self, ParamsError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParamsError::Empty);
        }
        match s.parse::<f32>() {
            Ok(v) if v.is_finite() => Ok(Self::new(v)),
            _ => Err(ParamsError::InvalidNumber {
                value: s.to_string(),
            }),
        }
    }

    /// Lenient parse used by clients: anything unreadable means 0.
    pub fn from_configstring(s: &str) -> Self {
        match Self::parse(s) {
            Ok(params) => params,
            Err(ParamsError::Empty) => Self::default(),
            Err(e) => {
                log::warn!("{e}, using default air acceleration");
                Self::default()
            }
        }
    }

    pub fn to_configstring(&self) -> String {
        format!("{}", self.airaccelerate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(PmoveParams::parse("0").unwrap().airaccelerate, 0.0);
        assert_eq!(PmoveParams::parse(" 1.5 ").unwrap().airaccelerate, 1.5);
        assert_eq!(PmoveParams::parse("-2").unwrap().airaccelerate, -2.0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PmoveParams::parse(""), Err(ParamsError::Empty));
        assert_eq!(PmoveParams::parse("   "), Err(ParamsError::Empty));
        assert_eq!(
            PmoveParams::parse("fast"),
            Err(ParamsError::InvalidNumber {
                value: "fast".to_string()
            })
        );
        assert!(PmoveParams::parse("inf").is_err());
        assert!(PmoveParams::parse("NaN").is_err());
    }

    #[test]
    fn test_lenient_parse_falls_back_to_zero() {
        assert_eq!(PmoveParams::from_configstring(""), PmoveParams::default());
        assert_eq!(PmoveParams::from_configstring("junk"), PmoveParams::default());
        assert_eq!(PmoveParams::from_configstring("4").airaccelerate, 4.0);
    }

    #[test]
    fn test_configstring_round_trip() {
        for v in [0.0f32, 1.0, 2.5, 10.0, -0.75] {
            let p = PmoveParams::new(v);
            assert_eq!(PmoveParams::parse(&p.to_configstring()), Ok(p));
        }
        assert_eq!(PmoveParams::default().to_configstring(), "0");
    }

    #[test]
    fn test_error_messages() {
        let e = PmoveParams::parse("x1").unwrap_err();
        assert_eq!(e.to_string(), "invalid air acceleration value 'x1'");
    }
}
