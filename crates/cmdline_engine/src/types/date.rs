use std::{fmt, rc::Rc};

use chrono::{Duration, Local, NaiveDate};
use cmdline_contract::TypeSpec;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg, Prediction, Predictions},
    error::TypeError,
    value::{TypedValue, DATE_FORMAT},
};

const KEYWORDS: [(&str, i64); 4] = [("today", 0), ("now", 0), ("yesterday", -1), ("tomorrow", 1)];

/// Options of the `date` factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DateOptions {
    /// Earliest accepted date, `YYYY-MM-DD`.
    pub min: Option<String>,
    /// Latest accepted date, `YYYY-MM-DD`.
    pub max: Option<String>,
    /// Increment/decrement step in days.
    pub step: Option<i64>,
}

/// Calendar date typed as `YYYY-MM-DD` or one of `today`, `now`, `yesterday`, `tomorrow`.
#[derive(Clone)]
pub struct DateType {
    min: Option<NaiveDate>,
    max: Option<NaiveDate>,
    step: i64,
    today: Rc<dyn Fn() -> NaiveDate>,
}

impl Default for DateType {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            step: 1,
            today: Rc::new(|| Local::now().date_naive()),
        }
    }
}

impl fmt::Debug for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateType")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl DateType {
    /// Date type limited to `[min, max]`.
    pub fn bounded(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    /// Replaces the clock used for relative keywords.
    pub fn with_today(mut self, today: impl Fn() -> NaiveDate + 'static) -> Self {
        self.today = Rc::new(today);
        self
    }

    pub(crate) fn from_options(options: DateOptions) -> Result<Self, TypeError> {
        let parse_bound = |bound: Option<String>| -> Result<Option<NaiveDate>, TypeError> {
            bound
                .map(|text| {
                    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|err| TypeError::InvalidOptions {
                        name: "date".into(),
                        message: format!("bad bound `{text}`: {err}"),
                    })
                })
                .transpose()
        };
        Ok(Self {
            min: parse_bound(options.min)?,
            max: parse_bound(options.max)?,
            step: options.step.filter(|step| *step > 0).unwrap_or(1),
            ..Self::default()
        })
    }

    fn clamp(&self, date: NaiveDate) -> NaiveDate {
        let mut date = date;
        if let Some(max) = self.max {
            date = date.min(max);
        }
        if let Some(min) = self.min {
            date = date.max(min);
        }
        date
    }

    fn keyword_predictions(prefix: &str) -> Vec<Prediction> {
        KEYWORDS
            .iter()
            .filter(|(keyword, _)| keyword.starts_with(prefix))
            .map(|(keyword, _)| Prediction::named(*keyword))
            .collect()
    }

    fn convert(&self, arg: &ParamArg) -> Conversion {
        let text = arg.text();
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return Conversion::incomplete(arg.clone(), "")
                .with_predictions(Predictions::ready(Self::keyword_predictions("")));
        }

        let keyword = KEYWORDS.iter().find(|(keyword, _)| *keyword == lowered);
        let parsed = match keyword {
            Some((_, offset)) => (self.today)().checked_add_signed(Duration::days(*offset)),
            None => NaiveDate::parse_from_str(&lowered, DATE_FORMAT).ok(),
        };

        let Some(date) = parsed else {
            let predictions = Self::keyword_predictions(&lowered);
            if !predictions.is_empty() {
                return Conversion::incomplete(arg.clone(), "").with_predictions(Predictions::ready(predictions));
            }
            if lowered.len() < 10 && lowered.chars().all(|ch| ch.is_ascii_digit() || ch == '-') {
                return Conversion::incomplete(arg.clone(), "");
            }
            return Conversion::error(arg.clone(), format!("Can't convert \"{text}\" to a date."));
        };

        if let Some(min) = self.min.filter(|min| date < *min) {
            return Conversion::error(
                arg.clone(),
                format!("{} is earlier than minimum allowed: {}.", date.format(DATE_FORMAT), min.format(DATE_FORMAT)),
            );
        }
        if let Some(max) = self.max.filter(|max| date > *max) {
            return Conversion::error(
                arg.clone(),
                format!("{} is later than maximum allowed: {}.", date.format(DATE_FORMAT), max.format(DATE_FORMAT)),
            );
        }
        Conversion::valid(TypedValue::Date(date), arg.clone())
    }

    fn shift(&self, value: Option<&TypedValue>, days: i64) -> TypedValue {
        let shifted = match value.and_then(TypedValue::as_date) {
            None => (self.today)(),
            Some(current) => current
                .checked_add_signed(Duration::days(days))
                .unwrap_or(current),
        };
        TypedValue::Date(self.clamp(shifted))
    }
}

impl Type for DateType {
    fn name(&self) -> &str {
        "date"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        let conversion = self.convert(arg);
        Box::pin(async move { conversion })
    }

    fn increment<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        let next = self.shift(value, self.step);
        Box::pin(async move { Some(next) })
    }

    fn decrement<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        let previous = self.shift(value, -self.step);
        Box::pin(async move { Some(previous) })
    }

    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        let mut options = Map::new();
        if let Some(min) = self.min {
            options.insert("min".into(), Value::String(min.format(DATE_FORMAT).to_string()));
        }
        if let Some(max) = self.max {
            options.insert("max".into(), Value::String(max.format(DATE_FORMAT).to_string()));
        }
        if self.step != 1 {
            options.insert("step".into(), Value::from(self.step));
        }
        if options.is_empty() {
            TypeSpec::named("date")
        } else {
            TypeSpec::Inline {
                name: "date".into(),
                options,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Location, context::Environment};
    use cmdline_contract::Status;
    use cmdline_lexer::tokenize;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn fixed() -> DateType {
        DateType::bounded(Some(ymd(2024, 1, 1)), Some(ymd(2024, 12, 31))).with_today(|| ymd(2024, 6, 15))
    }

    fn parse(date: &DateType, text: &str) -> Conversion {
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let arg = tokenize(&format!("d {text}"))
            .get(1)
            .cloned()
            .map(ParamArg::Single)
            .unwrap_or(ParamArg::Blank);
        block_on(date.parse(&arg, &context))
    }

    #[test]
    fn parses_iso_dates_and_keywords() {
        let date = fixed();
        assert_eq!(parse(&date, "2024-02-29").value(), Some(&TypedValue::Date(ymd(2024, 2, 29))));
        assert_eq!(parse(&date, "Yesterday").value(), Some(&TypedValue::Date(ymd(2024, 6, 14))));
        assert_eq!(parse(&date, "now").value(), Some(&TypedValue::Date(ymd(2024, 6, 15))));
    }

    #[test]
    fn partial_input_is_incomplete_and_garbage_is_error() {
        let date = fixed();
        assert_eq!(parse(&date, "").status(), Status::Incomplete);
        assert_eq!(parse(&date, "2024-0").status(), Status::Incomplete);
        let partial = parse(&date, "to");
        assert_eq!(partial.status(), Status::Incomplete);
        assert_eq!(
            partial.predictions().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["today", "tomorrow"]
        );
        assert_eq!(parse(&date, "soon").status(), Status::Error);
        assert_eq!(parse(&date, "2023-12-31").status(), Status::Error);
    }

    #[test]
    fn stepping_is_clamped() {
        let date = fixed();
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let end = TypedValue::Date(ymd(2024, 12, 31));
        assert_eq!(block_on(date.increment(Some(&end), &context)), Some(end.clone()));
        assert_eq!(
            block_on(date.decrement(Some(&end), &context)),
            Some(TypedValue::Date(ymd(2024, 12, 30)))
        );
        assert_eq!(
            block_on(date.increment(None, &context)),
            Some(TypedValue::Date(ymd(2024, 6, 15)))
        );
    }

    #[test]
    fn stringify_round_trips() {
        let date = fixed();
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let parsed = parse(&date, "2024-03-05");
        let text = date.stringify(parsed.value().expect("value"), &context);
        assert_eq!(text, "2024-03-05");
        assert_eq!(parse(&date, &text).value(), parsed.value());
    }
}
