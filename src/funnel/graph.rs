//! Step graph: the funnel's steps as data, filtered by visibility.

use std::collections::HashSet;

use super::record::{AnswerRecord, PropertyType};
use super::step::{StepDefinition, StepKind};
use crate::error::FunnelError;

const REGIONS: &[&str] = &[
    "Northland",
    "Auckland",
    "Waikato",
    "Bay of Plenty",
    "Gisborne",
    "Hawke's Bay",
    "Taranaki",
    "Manawatū-Whanganui",
    "Wellington",
    "Tasman",
    "Nelson",
    "Marlborough",
    "West Coast",
    "Canterbury",
    "Otago",
    "Southland",
];

fn is_commercial(record: &AnswerRecord) -> bool {
    record.property_type() == Some(PropertyType::Commercial)
}

fn is_residential(record: &AnswerRecord) -> bool {
    record.property_type() == Some(PropertyType::Residential)
}

fn wants_grid_sell_back(record: &AnswerRecord) -> bool {
    record.get_str("gridSellBackInterest") != Some("No")
}

/// The production funnel, in display order.
pub static DEFAULT_STEPS: &[StepDefinition] = &[
    StepDefinition::choice(
        "motivation",
        "What's your main reason for going solar at {address}?",
        &[
            "Save money on power bills",
            "The environment",
            "Energy independence",
            "Increase property value",
        ],
    ),
    StepDefinition::choice(
        "businessType",
        "What kind of business operates at {address}?",
        &["Office", "Retail", "Industrial", "Agricultural", "Other"],
    )
    .visible_when(is_commercial),
    StepDefinition::choice(
        "roofType",
        "What type of roof do you have?",
        &["Iron/Metal", "Tile", "Bitumen/Membrane", "Other"],
    ),
    StepDefinition::slider("householdSize", "How many people live at your address?", 1, 10, 1)
        .visible_when(is_residential),
    StepDefinition::slider("monthlyBill", "What's your average monthly power bill?", 75, 700, 5),
    StepDefinition::interstitial(
        "analysing",
        StepKind::InterstitialAnimation,
        "Analysing solar potential for {address}...",
        2_500,
    ),
    StepDefinition::interstitial(
        "savingsSummary",
        StepKind::InterstitialSummary,
        "You could save up to {savingsPercent}% on your power bill",
        4_000,
    ),
    StepDefinition::choice("island", "Which island are you on?", &["North Island", "South Island"]),
    StepDefinition::choice("region", "Which region are you in?", REGIONS),
    StepDefinition::choice(
        "gridSellBackInterest",
        "Are you interested in selling excess power back to the grid?",
        &["Yes", "No", "Not sure"],
    ),
    StepDefinition::choice(
        "changePowerCompanyInterest",
        "Would you consider changing power company for a better buy-back rate?",
        &["Yes", "No"],
    )
    .visible_when(wants_grid_sell_back),
    StepDefinition::text("firstName", "What's your first name?", true),
    StepDefinition::text("lastName", "And your last name, {firstName}?", false),
    StepDefinition::choice(
        "financeInterest",
        "Do you want us to show you some finance options?",
        &["Why not!", "Will sort myself"],
    ),
    StepDefinition::display(
        "estimate",
        StepKind::Calculation,
        "Your estimated saving: {savingsPercent}% off your power bill",
    ),
    StepDefinition::contact("contactInfo", "Where should we send your quote?", &["email", "phone"]),
    StepDefinition::display("confirmation", StepKind::Final, "Thank you, {firstName}!"),
];

/// Validated, immutable list of funnel steps.
#[derive(Debug, Clone)]
pub struct StepGraph {
    steps: &'static [StepDefinition],
}

impl StepGraph {
    /// Validate a step list: unique ids, sane slider bounds, choice options
    /// present, interstitials carrying a duration.
    pub fn new(steps: &'static [StepDefinition]) -> Result<Self, FunnelError> {
        if steps.is_empty() {
            return Err(FunnelError::InvalidGraph("step list is empty".into()));
        }
        let mut seen = HashSet::new();
        for step in steps {
            if !seen.insert(step.id) {
                return Err(FunnelError::InvalidGraph(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
            match step.kind {
                StepKind::Choice if step.options.is_empty() => {
                    return Err(FunnelError::InvalidGraph(format!(
                        "choice step '{}' has no options",
                        step.id
                    )));
                }
                StepKind::Slider => match step.slider {
                    Some(b) if b.min <= b.max && b.step > 0 => {}
                    _ => {
                        return Err(FunnelError::InvalidGraph(format!(
                            "slider step '{}' needs min <= max and step > 0",
                            step.id
                        )));
                    }
                },
                StepKind::Contact if step.fields.is_empty() => {
                    return Err(FunnelError::InvalidGraph(format!(
                        "contact step '{}' has no fields",
                        step.id
                    )));
                }
                kind if kind.is_interstitial() && step.auto_advance_ms.is_none() => {
                    return Err(FunnelError::InvalidGraph(format!(
                        "interstitial step '{}' has no auto-advance duration",
                        step.id
                    )));
                }
                _ => {}
            }
            if !step.kind.is_interstitial() && step.auto_advance_ms.is_some() {
                return Err(FunnelError::InvalidGraph(format!(
                    "step '{}' is not interstitial but auto-advances",
                    step.id
                )));
            }
        }
        Ok(Self { steps })
    }

    /// The production funnel.
    /// The built-in quote funnel, validated like any other step list.
    pub fn default_funnel() -> Result<Self, FunnelError> {
        Self::new(DEFAULT_STEPS)
    }

    pub fn all(&self) -> &'static [StepDefinition] {
        self.steps
    }

    pub fn get(&self, id: &str) -> Option<&'static StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Steps that apply to `record`, in authored order.
    pub fn visible_steps(&self, record: &AnswerRecord) -> Vec<&'static StepDefinition> {
        self.steps.iter().filter(|s| s.is_visible(record)).collect()
    }
}
