use std::fmt;
use std::str::FromStr;

use crate::CliError;

/// column (feature) scaling methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnScaling {
    /// double sigmoid with the upper quantile given in percent (sig95, sig97.5)
    Sigmoid(f64),
    /// divide by the sample standard deviation
    Whiten,
}

impl ColumnScaling {
    pub fn upper_quantile(&self) -> Option<f64> {
        match self {
            ColumnScaling::Sigmoid(hi) => Some(*hi / 100.0),
            ColumnScaling::Whiten => None,
        }
    }
}

impl FromStr for ColumnScaling {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "whiten" {
            return Ok(ColumnScaling::Whiten);
        }

        match s.strip_prefix("sig").map(|hi| hi.parse::<f64>()) {
            Some(Ok(hi)) if hi > 0.0 && hi <= 100.0 => Ok(ColumnScaling::Sigmoid(hi)),
            _ => Err(CliError::InvalidInput(format!(
                "ERROR: unknown column scaling method {:?}, expected sigNN or whiten",
                s
            ))),
        }
    }
}

impl fmt::Display for ColumnScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnScaling::Sigmoid(hi) => write!(f, "sig{}", hi),
            ColumnScaling::Whiten => write!(f, "whiten"),
        }
    }
}

/// paired sample scaling methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairScaling {
    Deseq,
}

impl FromStr for PairScaling {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deseq" => Ok(PairScaling::Deseq),
            _ => Err(CliError::InvalidInput(format!(
                "ERROR: unknown pair scaling method {:?}, expected deseq",
                s
            ))),
        }
    }
}

impl fmt::Display for PairScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairScaling::Deseq => write!(f, "deseq"),
        }
    }
}

/// matrix factorization initialization methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitMethod {
    Nndsvd,
    Nndsvda,
    Nndsvdar,
    Random,
}

impl FromStr for InitMethod {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nndsvd" => Ok(InitMethod::Nndsvd),
            "nndsvda" => Ok(InitMethod::Nndsvda),
            "nndsvdar" => Ok(InitMethod::Nndsvdar),
            "random" => Ok(InitMethod::Random),
            _ => Err(CliError::InvalidInput(format!(
                "ERROR: unknown init method {:?}, expected one of: nndsvd, nndsvda, nndsvdar, random",
                s
            ))),
        }
    }
}

impl fmt::Display for InitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitMethod::Nndsvd => "nndsvd",
            InitMethod::Nndsvda => "nndsvda",
            InitMethod::Nndsvdar => "nndsvdar",
            InitMethod::Random => "random",
        };
        write!(f, "{}", name)
    }
}

/// typed value of a "key:value" parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}
