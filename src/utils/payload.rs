//! Callback payload codec. Every inline button carries one `Payload`;
//! the callback handler parses it back and dispatches on the op.

use std::fmt::Display;
use std::str::FromStr;

use lazy_static::lazy_static;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use regex::Regex;

use crate::wizard::steps::StepId;

lazy_static! {
    static ref PAYLOAD_RE: Regex = Regex::new(concat!(
        r"^(?<op>\d+)",
        r"(\ss(?<step>\d+))?",
        r"(\sc(?<choice>\d+))?",
        r"(\sa(?<amount>\d+))?",
        r"(\sm(?<menu>\d+))?$"
    ))
    .unwrap();
}

macro_rules! write_arg {
    ($args:expr, $prefix:expr, $item:expr) => {
        if let Some(some) = $item.as_ref() {
            $args.push(format!("{}{}", $prefix, some));
        };
    };
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum PayloadOp {
    #[default]
    None = 0,
    Answer,
    Back,
    Cancel,
    PhotosDone,
    Publish,
    PublishAnyway,
    AcceptCensored,
    BuyPremium,
    Donate,
    Menu,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Payload {
    pub op: PayloadOp,
    pub step: Option<u8>,
    pub choice: Option<usize>,
    pub amount: Option<u32>,
    pub menu: Option<u8>,
}

impl Payload {
    pub fn answer(step: StepId, choice: usize) -> Self {
        Self {
            op: PayloadOp::Answer,
            step: Some(step.code()),
            choice: Some(choice),
            ..Default::default()
        }
    }

    pub fn op_only(op: PayloadOp) -> Self {
        Self {
            op,
            ..Default::default()
        }
    }

    pub fn donate(amount: u32) -> Self {
        Self {
            op: PayloadOp::Donate,
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn menu(code: u8) -> Self {
        Self {
            op: PayloadOp::Menu,
            menu: Some(code),
            ..Default::default()
        }
    }

    pub fn step_id(&self) -> Option<StepId> {
        self.step.and_then(StepId::from_code)
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut args = vec![(self.op as u8).to_string()];

        write_arg!(args, "s", self.step);
        write_arg!(args, "c", self.choice);
        write_arg!(args, "a", self.amount);
        write_arg!(args, "m", self.menu);

        write!(f, "{}", args.join(" "))
    }
}

impl FromStr for Payload {
    type Err = PayloadError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let captures = PAYLOAD_RE
            .captures(payload)
            .ok_or_else(|| PayloadError::Invalid(payload.to_owned()))?;

        let op: PayloadOp = captures
            .name("op")
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .and_then(FromPrimitive::from_u8)
            .ok_or_else(|| PayloadError::InvalidOp(payload.to_owned()))?;

        let step = captures
            .name("step")
            .map(|m| m.as_str().parse::<u8>())
            .transpose()
            .map_err(|_| PayloadError::InvalidArg(payload.to_owned()))?;

        let choice = captures
            .name("choice")
            .map(|m| m.as_str().parse::<usize>())
            .transpose()
            .map_err(|_| PayloadError::InvalidArg(payload.to_owned()))?;

        let amount = captures
            .name("amount")
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map_err(|_| PayloadError::InvalidArg(payload.to_owned()))?;

        let menu = captures
            .name("menu")
            .map(|m| m.as_str().parse::<u8>())
            .transpose()
            .map_err(|_| PayloadError::InvalidArg(payload.to_owned()))?;

        Ok(Payload {
            op,
            step,
            choice,
            amount,
            menu,
        })
    }
}

#[derive(Debug)]
pub enum PayloadError {
    Invalid(String),
    InvalidOp(String),
    InvalidArg(String),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Invalid(payload) => write!(f, "invalid payload: {}", payload),
            PayloadError::InvalidOp(payload) => write!(f, "invalid op in payload: {}", payload),
            PayloadError::InvalidArg(payload) => write!(f, "invalid arg in payload: {}", payload),
        }
    }
}

impl std::error::Error for PayloadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_round_trips() {
        let payload = Payload::answer(StepId::Memory, 2);
        let parsed: Payload = payload.to_string().parse().unwrap();

        assert_eq!(parsed, payload);
        assert_eq!(parsed.step_id(), Some(StepId::Memory));
        assert_eq!(parsed.choice, Some(2));
    }

    #[test]
    fn bare_ops_round_trip() {
        for op in [
            PayloadOp::Back,
            PayloadOp::Cancel,
            PayloadOp::PhotosDone,
            PayloadOp::Publish,
            PayloadOp::PublishAnyway,
            PayloadOp::AcceptCensored,
            PayloadOp::BuyPremium,
        ] {
            let parsed: Payload = Payload::op_only(op).to_string().parse().unwrap();
            assert_eq!(parsed.op, op);
        }
    }

    #[test]
    fn donation_amount_survives() {
        let parsed: Payload = Payload::donate(25).to_string().parse().unwrap();
        assert_eq!(parsed.op, PayloadOp::Donate);
        assert_eq!(parsed.amount, Some(25));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("".parse::<Payload>().is_err());
        assert!("99".parse::<Payload>().is_err());
        assert!("hello".parse::<Payload>().is_err());
    }
}
