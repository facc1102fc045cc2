//! Step definitions: the static shape of every funnel screen.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::record::AnswerRecord;

/// What a step asks for and how it is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Choice,
    Slider,
    Text,
    Contact,
    InterstitialAnimation,
    InterstitialSummary,
    Calculation,
    Transition,
    Final,
}

impl StepKind {
    /// Interstitial steps advance on their own after `auto_advance_ms`.
    pub fn is_interstitial(&self) -> bool {
        matches!(self, Self::InterstitialAnimation | Self::InterstitialSummary)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Choice => "choice",
            Self::Slider => "slider",
            Self::Text => "text",
            Self::Contact => "contact",
            Self::InterstitialAnimation => "interstitial-animation",
            Self::InterstitialSummary => "interstitial-summary",
            Self::Calculation => "calculation",
            Self::Transition => "transition",
            Self::Final => "final",
        };
        write!(f, "{s}")
    }
}

/// Inclusive integer range of a slider step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SliderBounds {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl SliderBounds {
    /// Clamp raw user input into `[min, max]`.
    ///
    /// Numbers are rounded to the nearest integer; numeric strings are
    /// parsed; anything else is treated as `min`.
    pub fn clamp(&self, raw: &Value) -> i64 {
        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed.filter(|v| v.is_finite()) {
            Some(v) => {
                let rounded = v.round();
                if rounded <= self.min as f64 {
                    self.min
                } else if rounded >= self.max as f64 {
                    self.max
                } else {
                    rounded as i64
                }
            }
            None => self.min,
        }
    }
}

/// Visibility predicate over the in-progress answers.
pub type VisibleWhen = fn(&AnswerRecord) -> bool;

/// One statically defined funnel step.
#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub id: &'static str,
    pub kind: StepKind,
    /// Title template; `{field}` placeholders are filled from the record.
    pub title: &'static str,
    pub options: &'static [&'static str],
    pub slider: Option<SliderBounds>,
    /// Constituent fields of a contact step.
    pub fields: &'static [&'static str],
    pub required: bool,
    pub visible_when: Option<VisibleWhen>,
    pub auto_advance_ms: Option<u64>,
}

impl StepDefinition {
    const fn base(id: &'static str, kind: StepKind, title: &'static str) -> Self {
        Self {
            id,
            kind,
            title,
            options: &[],
            slider: None,
            fields: &[],
            required: false,
            visible_when: None,
            auto_advance_ms: None,
        }
    }

    pub const fn choice(
        id: &'static str,
        title: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        let mut step = Self::base(id, StepKind::Choice, title);
        step.options = options;
        step.required = true;
        step
    }

    pub const fn slider(id: &'static str, title: &'static str, min: i64, max: i64, step: i64) -> Self {
        let mut def = Self::base(id, StepKind::Slider, title);
        def.slider = Some(SliderBounds { min, max, step });
        def.required = true;
        def
    }

    pub const fn text(id: &'static str, title: &'static str, required: bool) -> Self {
        let mut step = Self::base(id, StepKind::Text, title);
        step.required = required;
        step
    }

    pub const fn contact(
        id: &'static str,
        title: &'static str,
        fields: &'static [&'static str],
    ) -> Self {
        let mut step = Self::base(id, StepKind::Contact, title);
        step.fields = fields;
        step.required = true;
        step
    }

    /// An interstitial step. `kind` must be one of the interstitial kinds.
    pub const fn interstitial(
        id: &'static str,
        kind: StepKind,
        title: &'static str,
        auto_advance_ms: u64,
    ) -> Self {
        let mut step = Self::base(id, kind, title);
        step.auto_advance_ms = Some(auto_advance_ms);
        step
    }

    pub const fn display(id: &'static str, kind: StepKind, title: &'static str) -> Self {
        Self::base(id, kind, title)
    }

    pub const fn visible_when(mut self, predicate: VisibleWhen) -> Self {
        self.visible_when = Some(predicate);
        self
    }

    pub fn is_visible(&self, record: &AnswerRecord) -> bool {
        self.visible_when.is_none_or(|predicate| predicate(record))
    }

    /// Fill `{field}` placeholders in the title. Unknown fields render empty.
    pub fn render_title(&self, record: &AnswerRecord) -> String {
        let mut out = String::with_capacity(self.title.len());
        let mut rest = self.title;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    if let Some(value) = record.display(key) {
                        out.push_str(&value);
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
