use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AmountError;

pub const MAX_CONFIDENCE: u8 = 100;
pub const MANUAL_SELECTION_REASONING: &str = "Manually selected by user";
pub const MANUAL_ADDITION_REASONING: &str = "Manually added by user";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OfferId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub String);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Sum of `total_price` over every line of an offer, selected or not.
///
/// This is the figure shown as the offer's face value in listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FaceValueTotal(pub Decimal);

/// Sum of `total_price` over the selected lines only.
///
/// This is the amount that would be handed to the ERP on submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SelectedTotal(pub Decimal);

impl FaceValueTotal {
    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl SelectedTotal {
    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for FaceValueTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl fmt::Display for SelectedTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Aggregate selection used by the header checkbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    AllSelected,
    SomeSelected,
    NoneSelected,
}

/// One matched item of an offer.
///
/// Fields are private so that `total_price` can only change together with `quantity`
/// or `unit_price`. Lines decoded from the wire recompute their total instead of
/// trusting the transmitted one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineRecord", into = "LineRecord")]
pub struct Line {
    id: LineId,
    product_code: String,
    product_name: String,
    original_term: String,
    quantity: u32,
    unit_price: Decimal,
    total_price: Decimal,
    confidence: u8,
    reasoning: String,
    selected: bool,
}

impl Line {
    /// Fails when `quantity * unit_price` does not fit a `Decimal`.
    pub fn new(
        id: LineId,
        product_code: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
    ) -> Result<Self, AmountError> {
        let quantity = quantity.max(1);
        let unit_price = unit_price.max(Decimal::ZERO);
        let total_price =
            line_total(quantity, unit_price).ok_or_else(|| AmountError::Line(id.clone()))?;
        Ok(Self {
            id,
            product_code: product_code.into(),
            product_name: product_name.into(),
            original_term: String::new(),
            quantity,
            unit_price,
            total_price,
            confidence: 0,
            reasoning: String::new(),
            selected: true,
        })
    }

    /// Builds a line priced in hundredths; this range can never overflow.
    pub fn from_cents(
        id: LineId,
        product_code: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Self {
        let quantity = quantity.max(1);
        let cents = unit_price_cents.max(0);
        // |cents| < 2^63 and quantity < 2^32, so the product stays below the 96-bit mantissa.
        let total_cents = i128::from(cents) * i128::from(quantity);
        Self {
            id,
            product_code: product_code.into(),
            product_name: product_name.into(),
            original_term: String::new(),
            quantity,
            unit_price: Decimal::new(cents, 2),
            total_price: Decimal::from_i128_with_scale(total_cents, 2),
            confidence: 0,
            reasoning: String::new(),
            selected: true,
        }
    }

    pub fn with_original_term(mut self, original_term: impl Into<String>) -> Self {
        self.original_term = original_term.into();
        self
    }

    pub fn with_match(mut self, confidence: u8, reasoning: impl Into<String>) -> Self {
        self.confidence = confidence.min(MAX_CONFIDENCE);
        self.reasoning = reasoning.into();
        self
    }

    pub fn id(&self) -> &LineId {
        &self.id
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn original_term(&self) -> &str {
        &self.original_term
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Leaves the line untouched when the new total would overflow.
    pub(crate) fn set_quantity(&mut self, quantity: u32) -> Result<(), AmountError> {
        let quantity = quantity.max(1);
        self.total_price = line_total(quantity, self.unit_price)
            .ok_or_else(|| AmountError::Line(self.id.clone()))?;
        self.quantity = quantity;
        Ok(())
    }

    pub(crate) fn apply_manual_product(
        &mut self,
        product_code: String,
        product_name: String,
        unit_price: Decimal,
        reasoning: &str,
    ) -> Result<(), AmountError> {
        let unit_price = unit_price.max(Decimal::ZERO);
        self.total_price = line_total(self.quantity, unit_price)
            .ok_or_else(|| AmountError::Line(self.id.clone()))?;
        self.unit_price = unit_price;
        self.product_code = product_code;
        self.product_name = product_name;
        self.confidence = MAX_CONFIDENCE;
        self.reasoning = reasoning.to_owned();
        Ok(())
    }
}

fn line_total(quantity: u32, unit_price: Decimal) -> Option<Decimal> {
    unit_price.checked_mul(Decimal::from(quantity))
}

fn checked_sum(mut totals: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    totals.try_fold(Decimal::ZERO, |sum, total| sum.checked_add(total))
}

/// Turns loosely typed quantity input into a positive integer.
///
/// Anything that is not a number of at least one becomes `1`. Fractional input is
/// truncated before the check, so `"2.7"` is `2` and `"0.5"` is `1`.
pub fn coerce_quantity(raw: &str) -> u32 {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<i64>().ok().or_else(|| {
        trimmed.parse::<Decimal>().ok().and_then(|value| value.trunc().try_into().ok())
    });
    parsed.map(clamp_quantity).unwrap_or(1)
}

pub(crate) fn clamp_quantity(value: i64) -> u32 {
    if value < 1 {
        1
    } else {
        u32::try_from(value).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LineRecord {
    id: LineId,
    #[serde(default)]
    product_code: String,
    #[serde(default)]
    product_name: String,
    #[serde(default)]
    original_term: String,
    #[serde(default)]
    quantity: i64,
    #[serde(default)]
    unit_price: Decimal,
    #[serde(default)]
    total_price: Option<Decimal>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

impl TryFrom<LineRecord> for Line {
    type Error = AmountError;

    fn try_from(record: LineRecord) -> Result<Self, Self::Error> {
        let confidence = if record.confidence.is_finite() {
            record.confidence.round().clamp(0.0, f64::from(MAX_CONFIDENCE)) as u8
        } else {
            0
        };
        Ok(Line::new(
            record.id,
            record.product_code,
            record.product_name,
            clamp_quantity(record.quantity),
            record.unit_price,
        )?
        .with_original_term(record.original_term)
        .with_match(confidence, record.reasoning))
    }
}

impl From<Line> for LineRecord {
    fn from(line: Line) -> Self {
        Self {
            id: line.id,
            product_code: line.product_code,
            product_name: line.product_name,
            original_term: line.original_term,
            quantity: i64::from(line.quantity),
            unit_price: line.unit_price,
            total_price: Some(line.total_price),
            confidence: f64::from(line.confidence),
            reasoning: line.reasoning,
        }
    }
}

/// An offer as pending review.
///
/// Decoding rejects offers whose face value does not fit a `Decimal`, so the totals
/// below are always representable for offers that came off the wire or out of an
/// [`OfferEditor`](crate::editor::OfferEditor).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OfferRecord")]
pub struct Offer {
    pub id: OfferId,
    pub offer_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<Line>,
}

impl Offer {
    pub fn line(&self, line_id: &LineId) -> Option<&Line> {
        self.lines.iter().find(|line| &line.id == line_id)
    }

    pub(crate) fn line_mut(&mut self, line_id: &LineId) -> Option<&mut Line> {
        self.lines.iter_mut().find(|line| &line.id == line_id)
    }

    pub fn line_ids(&self) -> Vec<LineId> {
        self.lines.iter().map(|line| line.id.clone()).collect()
    }

    pub fn selected_line_ids(&self) -> Vec<LineId> {
        self.lines.iter().filter(|line| line.selected).map(|line| line.id.clone()).collect()
    }

    /// `None` when the line totals do not add up to a representable amount.
    pub fn checked_face_value(&self) -> Option<FaceValueTotal> {
        checked_sum(self.lines.iter().map(Line::total_price)).map(FaceValueTotal)
    }

    /// Saturates at `Decimal::MAX` for hand-built offers whose sum overflows.
    pub fn face_value(&self) -> FaceValueTotal {
        self.checked_face_value().unwrap_or(FaceValueTotal(Decimal::MAX))
    }

    /// Never exceeds the face value: line totals are non-negative.
    pub fn selected_total(&self) -> SelectedTotal {
        let selected = self.lines.iter().filter(|line| line.selected).map(Line::total_price);
        SelectedTotal(checked_sum(selected).unwrap_or(Decimal::MAX))
    }

    pub fn selection_state(&self) -> SelectionState {
        let selected = self.lines.iter().filter(|line| line.selected).count();
        match selected {
            0 => SelectionState::NoneSelected,
            count if count == self.lines.len() => SelectionState::AllSelected,
            _ => SelectionState::SomeSelected,
        }
    }
}

#[derive(Deserialize)]
struct OfferRecord {
    id: OfferId,
    #[serde(default)]
    offer_number: String,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    customer_email: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, alias = "items")]
    lines: Vec<Line>,
}

impl TryFrom<OfferRecord> for Offer {
    type Error = AmountError;

    fn try_from(record: OfferRecord) -> Result<Self, Self::Error> {
        let offer = Offer {
            id: record.id,
            offer_number: record.offer_number,
            customer_name: record.customer_name,
            customer_email: record.customer_email,
            created_at: record.created_at,
            lines: record.lines,
        };
        match offer.checked_face_value() {
            Some(_) => Ok(offer),
            None => Err(AmountError::Offer(offer.id)),
        }
    }
}
