//! Signal composer: the per-user accumulator of collected signal fields.
//!
//! Fields are collected in a fixed order. A field may only be recorded once
//! every required field before it is present; values themselves are stored
//! verbatim and judged by the receiving webhook.

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;

/// One field of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalField {
    Credential,
    TradeSide,
    Symbol,
    Risk,
    StopPrice,
    TakeProfit,
    Comment,
}

impl SignalField {
    /// Collection and wire order.
    pub const ORDER: [SignalField; 7] = [
        SignalField::Credential,
        SignalField::TradeSide,
        SignalField::Symbol,
        SignalField::Risk,
        SignalField::StopPrice,
        SignalField::TakeProfit,
        SignalField::Comment,
    ];

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::StopPrice | Self::TakeProfit | Self::Comment)
    }

    /// Whether strict-number mode requires this field to be a positive decimal.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Risk | Self::StopPrice | Self::TakeProfit)
    }

    fn position(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|f| f == self)
            .unwrap_or(Self::ORDER.len())
    }
}

impl std::fmt::Display for SignalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Credential => "credential",
            Self::TradeSide => "trade_side",
            Self::Symbol => "symbol",
            Self::Risk => "risk",
            Self::StopPrice => "stop_price",
            Self::TakeProfit => "take_profit",
            Self::Comment => "comment",
        };
        write!(f, "{s}")
    }
}

/// Parse a strictly positive decimal, as used by strict-number mode.
pub fn parse_positive_decimal(field: SignalField, input: &str) -> Result<Decimal, DraftError> {
    let value = Decimal::from_str(input.trim()).map_err(|e| DraftError::InvalidValue {
        field,
        reason: e.to_string(),
    })?;
    if value <= Decimal::ZERO {
        return Err(DraftError::InvalidValue {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

/// In-progress signal. Never persisted.
#[derive(Debug, Default)]
pub struct SignalDraft {
    credential: Option<SecretString>,
    trade_side: Option<String>,
    symbol: Option<String>,
    risk: Option<String>,
    stop_price: Option<String>,
    take_profit: Option<String>,
    comment: Option<String>,
}

impl SignalDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `field`, overwriting any earlier value.
    pub fn record(&mut self, field: SignalField, value: impl Into<String>) -> Result<(), DraftError> {
        self.ensure_ready_for(field)?;
        let value = value.into();
        match field {
            SignalField::Credential => self.credential = Some(SecretString::from(value)),
            SignalField::TradeSide => self.trade_side = Some(value),
            SignalField::Symbol => self.symbol = Some(value),
            SignalField::Risk => self.risk = Some(value),
            SignalField::StopPrice => self.stop_price = Some(value),
            SignalField::TakeProfit => self.take_profit = Some(value),
            SignalField::Comment => self.comment = Some(value),
        }
        Ok(())
    }

    /// Leave an optional field unset.
    pub fn skip(&mut self, field: SignalField) -> Result<(), DraftError> {
        if !field.is_optional() {
            return Err(DraftError::NotOptional(field));
        }
        self.ensure_ready_for(field)?;
        match field {
            SignalField::StopPrice => self.stop_price = None,
            SignalField::TakeProfit => self.take_profit = None,
            SignalField::Comment => self.comment = None,
            _ => {}
        }
        Ok(())
    }

    pub fn is_set(&self, field: SignalField) -> bool {
        match field {
            SignalField::Credential => self.credential.is_some(),
            SignalField::TradeSide => self.trade_side.is_some(),
            SignalField::Symbol => self.symbol.is_some(),
            SignalField::Risk => self.risk.is_some(),
            SignalField::StopPrice => self.stop_price.is_some(),
            SignalField::TakeProfit => self.take_profit.is_some(),
            SignalField::Comment => self.comment.is_some(),
        }
    }

    /// The collected credential in plaintext. Only for building the payload
    /// and for tests; never log the result.
    pub fn expose_credential(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.expose_secret())
    }

    /// Every required field that precedes `field` must already be present.
    fn ensure_ready_for(&self, field: SignalField) -> Result<(), DraftError> {
        SignalField::ORDER[..field.position()]
            .iter()
            .filter(|f| !f.is_optional())
            .find(|f| !self.is_set(**f))
            .map_or(Ok(()), |missing| Err(DraftError::MissingField(*missing)))
    }

    /// Consume the draft into a signal ready for dispatch.
    pub fn complete(self) -> Result<CompletedSignal, DraftError> {
        let credential = self
            .credential
            .ok_or(DraftError::MissingField(SignalField::Credential))?;
        let trade_side = self
            .trade_side
            .ok_or(DraftError::MissingField(SignalField::TradeSide))?;
        let symbol = self
            .symbol
            .ok_or(DraftError::MissingField(SignalField::Symbol))?;
        let risk = self.risk.ok_or(DraftError::MissingField(SignalField::Risk))?;

        Ok(CompletedSignal {
            credential,
            trade_side,
            symbol,
            risk,
            stop_price: self.stop_price,
            take_profit: self.take_profit,
            comment: self.comment,
        })
    }
}

/// A signal with every required field present.
#[derive(Debug)]
pub struct CompletedSignal {
    pub credential: SecretString,
    pub trade_side: String,
    pub symbol: String,
    pub risk: String,
    pub stop_price: Option<String>,
    pub take_profit: Option<String>,
    pub comment: Option<String>,
}

impl CompletedSignal {
    /// Wire format: `credential,side,symbol,risk=R[,sl=S][,tp=T][,comment="C"]`.
    pub fn to_payload(&self) -> String {
        let mut parts = vec![
            self.credential.expose_secret().to_string(),
            self.trade_side.clone(),
            self.symbol.clone(),
            format!("risk={}", self.risk),
        ];
        if let Some(ref sl) = self.stop_price {
            parts.push(format!("sl={sl}"));
        }
        if let Some(ref tp) = self.take_profit {
            parts.push(format!("tp={tp}"));
        }
        if let Some(ref comment) = self.comment {
            parts.push(format!("comment=\"{comment}\""));
        }
        parts.join(",")
    }

    /// Human-readable confirmation shown after a successful dispatch.
    pub fn summary(&self) -> String {
        format!(
            "Trading signal sent.\nOpen {} position for {} with a risk of {}.\nStop Loss: {}\nTake Profit: {}",
            self.trade_side,
            self.symbol,
            self.risk,
            self.stop_price.as_deref().unwrap_or("Not Provided"),
            self.take_profit.as_deref().unwrap_or("Not Provided"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_draft() -> SignalDraft {
        let mut draft = SignalDraft::new();
        draft.record(SignalField::Credential, "key-123").unwrap();
        draft.record(SignalField::TradeSide, "long").unwrap();
        draft.record(SignalField::Symbol, "BTCUSD").unwrap();
        draft.record(SignalField::Risk, "1").unwrap();
        draft
    }

    #[test]
    fn only_trailing_fields_are_optional() {
        let optional: Vec<_> = SignalField::ORDER
            .into_iter()
            .filter(|f| f.is_optional())
            .collect();
        assert_eq!(
            optional,
            vec![
                SignalField::StopPrice,
                SignalField::TakeProfit,
                SignalField::Comment
            ]
        );
    }

    #[test]
    fn record_requires_earlier_required_fields() {
        let mut draft = SignalDraft::new();
        let err = draft.record(SignalField::Symbol, "BTCUSD").unwrap_err();
        assert_eq!(err, DraftError::MissingField(SignalField::Credential));

        draft.record(SignalField::Credential, "key").unwrap();
        let err = draft.record(SignalField::Symbol, "BTCUSD").unwrap_err();
        assert_eq!(err, DraftError::MissingField(SignalField::TradeSide));
        assert!(!draft.is_set(SignalField::Symbol));
    }

    #[test]
    fn skipped_optionals_do_not_block_later_fields() {
        let mut draft = required_draft();
        draft.skip(SignalField::StopPrice).unwrap();
        draft.skip(SignalField::TakeProfit).unwrap();
        draft.record(SignalField::Comment, "hi").unwrap();
        assert!(!draft.is_set(SignalField::StopPrice));
        assert!(draft.is_set(SignalField::Comment));
    }

    #[test]
    fn required_fields_cannot_be_skipped() {
        let mut draft = SignalDraft::new();
        assert_eq!(
            draft.skip(SignalField::Credential).unwrap_err(),
            DraftError::NotOptional(SignalField::Credential)
        );
    }

    #[test]
    fn values_are_accepted_verbatim() {
        let mut draft = required_draft();
        draft.record(SignalField::StopPrice, "banana").unwrap();
        let signal = draft.complete().unwrap();
        assert_eq!(signal.stop_price.as_deref(), Some("banana"));
    }

    #[test]
    fn complete_fails_without_required_fields() {
        let mut draft = SignalDraft::new();
        draft.record(SignalField::Credential, "key").unwrap();
        draft.record(SignalField::TradeSide, "short").unwrap();
        assert_eq!(
            draft.complete().unwrap_err(),
            DraftError::MissingField(SignalField::Symbol)
        );
    }

    #[test]
    fn payload_without_optionals_has_four_tokens() {
        let signal = required_draft().complete().unwrap();
        let payload = signal.to_payload();
        assert_eq!(payload, "key-123,long,BTCUSD,risk=1");
        assert_eq!(payload.split(',').count(), 4);
        assert!(!payload.contains("sl="));
        assert!(!payload.contains("tp="));
        assert!(!payload.contains("comment="));
    }

    #[test]
    fn payload_with_all_optionals_is_ordered_and_quotes_comment() {
        let mut draft = required_draft();
        draft.record(SignalField::StopPrice, "49000").unwrap();
        draft.record(SignalField::TakeProfit, "52000").unwrap();
        draft.record(SignalField::Comment, "breakout").unwrap();
        let payload = draft.complete().unwrap().to_payload();
        assert_eq!(
            payload,
            "key-123,long,BTCUSD,risk=1,sl=49000,tp=52000,comment=\"breakout\""
        );
    }

    #[test]
    fn payload_with_only_take_profit() {
        let mut draft = required_draft();
        draft.skip(SignalField::StopPrice).unwrap();
        draft.record(SignalField::TakeProfit, "50000").unwrap();
        draft.skip(SignalField::Comment).unwrap();
        assert_eq!(
            draft.complete().unwrap().to_payload(),
            "key-123,long,BTCUSD,risk=1,tp=50000"
        );
    }

    #[test]
    fn summary_reports_missing_optionals() {
        let mut draft = required_draft();
        draft.record(SignalField::StopPrice, "49000").unwrap();
        let summary = draft.complete().unwrap().summary();
        assert!(summary.starts_with("Trading signal sent."));
        assert!(summary.contains("Open long position for BTCUSD with a risk of 1."));
        assert!(summary.contains("Stop Loss: 49000"));
        assert!(summary.contains("Take Profit: Not Provided"));
        assert!(!summary.contains("key-123"));
    }

    #[test]
    fn debug_output_redacts_credential() {
        let draft = required_draft();
        assert_eq!(draft.expose_credential(), Some("key-123"));
        assert!(!format!("{draft:?}").contains("key-123"));
        let signal = draft.complete().unwrap();
        assert!(!format!("{signal:?}").contains("key-123"));
    }

    #[test]
    fn positive_decimal_parsing() {
        assert_eq!(
            parse_positive_decimal(SignalField::Risk, " 1.5 ").unwrap(),
            Decimal::new(15, 1)
        );
        assert!(parse_positive_decimal(SignalField::Risk, "banana").is_err());
        assert!(parse_positive_decimal(SignalField::StopPrice, "0").is_err());
        assert!(parse_positive_decimal(SignalField::TakeProfit, "-3").is_err());
    }

    #[test]
    fn display_matches_serde() {
        for field in SignalField::ORDER {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(format!("\"{field}\""), json);
        }
    }
}
