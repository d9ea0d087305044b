//! Named scalar activations applied to raw decoder outputs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use triplanar_core::{Error, Result};

/// Elementwise activation, addressable by name in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    #[serde(rename = "none")]
    Identity,
    #[serde(rename = "exp")]
    Exp,
    /// Exponential whose gradient is clamped in training; at inference it is `exp`
    #[serde(rename = "trunc_exp")]
    TruncExp,
    #[serde(rename = "shifted_exp")]
    ShiftedExp,
    #[serde(rename = "shifted_trunc_exp")]
    ShiftedTruncExp,
    #[serde(rename = "sigmoid")]
    Sigmoid,
    #[serde(rename = "tanh")]
    Tanh,
    #[serde(rename = "relu")]
    Relu,
    #[serde(rename = "softplus")]
    Softplus,
    #[serde(rename = "shifted_softplus")]
    ShiftedSoftplus,
    /// Maps `[-1, 1]` onto `[0, 1]`
    #[serde(rename = "scale_-11_01")]
    ScaleToUnit,
}

const NAMES: [(&str, Activation); 11] = [
    ("none", Activation::Identity),
    ("exp", Activation::Exp),
    ("trunc_exp", Activation::TruncExp),
    ("shifted_exp", Activation::ShiftedExp),
    ("shifted_trunc_exp", Activation::ShiftedTruncExp),
    ("sigmoid", Activation::Sigmoid),
    ("tanh", Activation::Tanh),
    ("relu", Activation::Relu),
    ("softplus", Activation::Softplus),
    ("shifted_softplus", Activation::ShiftedSoftplus),
    ("scale_-11_01", Activation::ScaleToUnit),
];

impl Activation {
    /// Apply to a single value
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Exp | Activation::TruncExp => x.exp(),
            Activation::ShiftedExp | Activation::ShiftedTruncExp => (x - 1.0).exp(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::Softplus => softplus(x),
            Activation::ShiftedSoftplus => softplus(x - 1.0),
            Activation::ScaleToUnit => x * 0.5 + 0.5,
        }
    }

    /// Configuration name
    pub fn name(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, a)| a == self)
            .map(|(n, _)| *n)
            .unwrap_or("none")
    }
}

#[inline]
fn softplus(x: f32) -> f32 {
    // exp overflows f32 well before x = 20 stops mattering
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NAMES
            .iter()
            .find(|(n, _)| *n == s)
            .map(|(_, a)| *a)
            .ok_or_else(|| Error::Config(format!("unknown activation '{}'", s)))
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_names_round_trip() {
        for (name, activation) in NAMES {
            assert_eq!(name.parse::<Activation>().unwrap(), activation);
            assert_eq!(activation.to_string(), name);
        }
        assert!(matches!("gelu".parse::<Activation>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_values() {
        assert_relative_eq!(Activation::TruncExp.apply(0.0), 1.0);
        assert_relative_eq!(Activation::TruncExp.apply(2.0), 2.0f32.exp());
        assert_relative_eq!(Activation::ShiftedExp.apply(1.0), 1.0);
        assert_relative_eq!(Activation::Sigmoid.apply(0.0), 0.5);
        assert_relative_eq!(Activation::Relu.apply(-3.0), 0.0);
        assert_relative_eq!(Activation::Softplus.apply(0.0), 2.0f32.ln());
        assert_relative_eq!(Activation::Softplus.apply(50.0), 50.0);
        assert_relative_eq!(Activation::ScaleToUnit.apply(-1.0), 0.0);
        assert_relative_eq!(Activation::Identity.apply(-7.5), -7.5);
    }

    #[test]
    fn test_sigmoid_saturates_without_nan() {
        assert_relative_eq!(Activation::Sigmoid.apply(-200.0), 0.0);
        assert_relative_eq!(Activation::Sigmoid.apply(200.0), 1.0);
    }
}
