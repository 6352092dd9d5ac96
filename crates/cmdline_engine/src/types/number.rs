use cmdline_contract::TypeSpec;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    value::{format_number, TypedValue},
};

/// Options of the `number` factory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberOptions {
    /// Smallest accepted value.
    pub min: Option<f64>,
    /// Largest accepted value.
    pub max: Option<f64>,
    /// Increment/decrement step.
    pub step: f64,
    /// Accept fractional values.
    pub allow_float: bool,
}

impl Default for NumberOptions {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            step: 1.0,
            allow_float: false,
        }
    }
}

/// Integer or float with optional bounds and a step.
#[derive(Debug, Clone, Default)]
pub struct NumberType {
    options: NumberOptions,
}

impl NumberType {
    /// Integer type clamped to `[min, max]`.
    pub fn bounded(min: Option<f64>, max: Option<f64>) -> Self {
        Self::from_options(NumberOptions {
            min,
            max,
            ..NumberOptions::default()
        })
    }

    /// Sets the step.
    pub fn with_step(mut self, step: f64) -> Self {
        if step > 0.0 && step.is_finite() {
            self.options.step = step;
        }
        self
    }

    /// Accepts fractional values.
    pub fn allowing_float(mut self) -> Self {
        self.options.allow_float = true;
        self
    }

    pub(crate) fn from_options(mut options: NumberOptions) -> Self {
        if !(options.step > 0.0 && options.step.is_finite()) {
            options.step = 1.0;
        }
        Self { options }
    }

    fn convert(&self, arg: &ParamArg) -> Conversion {
        let text = arg.text();
        let trimmed = text.trim();
        if trimmed.is_empty() || matches!(trimmed, "-" | "." | "-.") {
            return Conversion::incomplete(arg.clone(), "");
        }

        let parsed = match trimmed.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => parsed,
            _ => return Conversion::error(arg.clone(), format!("Can't convert \"{text}\" to a number.")),
        };
        if !self.options.allow_float && parsed.fract() != 0.0 {
            return Conversion::error(arg.clone(), format!("Can't convert \"{text}\" to an integer."));
        }
        if let Some(min) = self.options.min {
            if parsed < min {
                return Conversion::error(
                    arg.clone(),
                    format!("{} is smaller than minimum allowed: {}.", format_number(parsed), format_number(min)),
                );
            }
        }
        if let Some(max) = self.options.max {
            if parsed > max {
                return Conversion::error(
                    arg.clone(),
                    format!("{} is greater than maximum allowed: {}.", format_number(parsed), format_number(max)),
                );
            }
        }
        Conversion::valid(TypedValue::Number(parsed), arg.clone())
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(max) = self.options.max {
            value = value.min(max);
        }
        if let Some(min) = self.options.min {
            value = value.max(min);
        }
        value
    }

    fn start(&self) -> f64 {
        self.clamp(self.options.min.unwrap_or(0.0))
    }

    fn step_up(&self, value: Option<&TypedValue>) -> TypedValue {
        let next = match value.and_then(TypedValue::as_f64) {
            None => self.start(),
            Some(current) => {
                let step = self.options.step;
                self.clamp(((current / step).floor() + 1.0) * step)
            }
        };
        TypedValue::Number(next)
    }

    fn step_down(&self, value: Option<&TypedValue>) -> TypedValue {
        let previous = match value.and_then(TypedValue::as_f64) {
            None => self.start(),
            Some(current) => {
                let step = self.options.step;
                self.clamp(((current / step).ceil() - 1.0) * step)
            }
        };
        TypedValue::Number(previous)
    }
}

impl Type for NumberType {
    fn name(&self) -> &str {
        "number"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        let conversion = self.convert(arg);
        Box::pin(async move { conversion })
    }

    fn stringify(&self, value: &TypedValue, _context: &ExecutionContext) -> String {
        match value {
            TypedValue::Number(number) => format_number(*number),
            other => other.to_display_string(),
        }
    }

    fn increment<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        let next = self.step_up(value);
        Box::pin(async move { Some(next) })
    }

    fn decrement<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        let previous = self.step_down(value);
        Box::pin(async move { Some(previous) })
    }

    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        let mut options = Map::new();
        if let Some(min) = self.options.min {
            options.insert("min".into(), Value::from(min));
        }
        if let Some(max) = self.options.max {
            options.insert("max".into(), Value::from(max));
        }
        if self.options.step != 1.0 {
            options.insert("step".into(), Value::from(self.options.step));
        }
        if self.options.allow_float {
            options.insert("allowFloat".into(), Value::Bool(true));
        }
        if options.is_empty() {
            TypeSpec::named("number")
        } else {
            TypeSpec::Inline {
                name: "number".into(),
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

    fn context() -> ExecutionContext {
        ExecutionContext::detached(Environment::new(), Location::Server)
    }

    fn parse(number: &NumberType, text: &str) -> Conversion {
        let arguments = tokenize(&format!("n {text}"));
        let arg = arguments
            .get(1)
            .cloned()
            .map(ParamArg::Single)
            .unwrap_or(ParamArg::Blank);
        block_on(number.parse(&arg, &context()))
    }

    #[test]
    fn parses_and_reports_statuses() {
        let number = NumberType::bounded(Some(0.0), Some(10.0));
        assert_eq!(parse(&number, "").status(), Status::Incomplete);
        assert_eq!(parse(&number, "-").status(), Status::Incomplete);
        assert_eq!(parse(&number, "7").value(), Some(&TypedValue::Number(7.0)));
        assert_eq!(parse(&number, "abc").status(), Status::Error);
        assert_eq!(parse(&number, "inf").status(), Status::Error);
        assert_eq!(parse(&number, "1.5").status(), Status::Error);
        let too_big = parse(&number, "11");
        assert_eq!(too_big.status(), Status::Error);
        assert_eq!(too_big.message(), "11 is greater than maximum allowed: 10.");
        assert_eq!(parse(&number.clone().allowing_float(), "1.5").status(), Status::Valid);
    }

    #[test]
    fn stepping_stays_within_bounds() {
        let number = NumberType::bounded(Some(0.0), Some(3.0));
        let ctx = context();
        let mut value = TypedValue::Number(1.0);
        for _ in 0..10 {
            value = block_on(number.increment(Some(&value), &ctx)).expect("ordinal");
            let current = value.as_f64().expect("number");
            assert!((0.0..=3.0).contains(&current));
        }
        assert_eq!(value, TypedValue::Number(3.0));

        for _ in 0..10 {
            value = block_on(number.decrement(Some(&value), &ctx)).expect("ordinal");
        }
        assert_eq!(value, TypedValue::Number(0.0));
        let again = block_on(number.decrement(Some(&value), &ctx));
        assert_eq!(again, Some(TypedValue::Number(0.0)));
    }

    #[test]
    fn stepping_snaps_to_step_and_starts_at_min() {
        let number = NumberType::bounded(Some(2.0), None).with_step(5.0).allowing_float();
        let ctx = context();
        assert_eq!(block_on(number.increment(None, &ctx)), Some(TypedValue::Number(2.0)));
        assert_eq!(
            block_on(number.increment(Some(&TypedValue::Number(7.0)), &ctx)),
            Some(TypedValue::Number(10.0))
        );
        assert_eq!(
            block_on(number.decrement(Some(&TypedValue::Number(7.0)), &ctx)),
            Some(TypedValue::Number(5.0))
        );
        assert_eq!(
            block_on(number.decrement(Some(&TypedValue::Number(3.0)), &ctx)),
            Some(TypedValue::Number(2.0))
        );
    }

    #[test]
    fn stringify_round_trips() {
        let number = NumberType::default().allowing_float();
        let ctx = context();
        for text in ["0", "-4", "2.25", "1000000"] {
            let parsed = parse(&number, text);
            let rendered = number.stringify(parsed.value().expect("value"), &ctx);
            assert_eq!(parse(&number, &rendered).value(), parsed.value());
        }
    }

    #[test]
    fn spec_carries_non_default_options() {
        assert_eq!(NumberType::default().spec("c", "p"), TypeSpec::named("number"));
        let spec = NumberType::bounded(Some(1.0), None).spec("c", "p");
        assert_eq!(spec.options().get("min"), Some(&Value::from(1.0)));
    }
}
