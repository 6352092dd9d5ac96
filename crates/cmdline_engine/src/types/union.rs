use std::rc::Rc;

use cmdline_contract::{Status, TypeSpec};
use serde::Deserialize;
use serde_json::json;

use super::{cannot_use, Type, TypeFuture, TypeRegistry};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg, Prediction, Predictions},
    error::TypeError,
    value::TypedValue,
};

/// Options of the `union` factory.
#[derive(Debug, Clone, Deserialize)]
pub struct UnionOptions {
    /// Alternatives, tried in order.
    pub alternatives: Vec<TypeSpec>,
}

/// Value accepted by the first of several alternative types.
#[derive(Clone)]
pub struct UnionType {
    alternatives: Vec<Rc<dyn Type>>,
}

impl UnionType {
    /// Union over `alternatives`, tried in order.
    pub fn new(alternatives: Vec<Rc<dyn Type>>) -> Self {
        Self { alternatives }
    }

    pub(crate) fn from_options(options: UnionOptions, types: &TypeRegistry) -> Result<Self, TypeError> {
        let alternatives = options
            .alternatives
            .iter()
            .map(|spec| types.resolve(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(alternatives))
    }
}

impl Type for UnionType {
    fn name(&self) -> &str {
        "union"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        Box::pin(async move {
            let mut predictions: Vec<Prediction> = Vec::new();
            let mut incomplete = false;
            for alternative in &self.alternatives {
                let conversion = alternative.parse(arg, context).await;
                match conversion.status() {
                    Status::Valid => {
                        let value = conversion.value().cloned().unwrap_or_default();
                        return Conversion::valid(
                            TypedValue::Union {
                                type_name: alternative.name().to_string(),
                                value: Box::new(value),
                            },
                            arg.clone(),
                        )
                        .with_predictions(conversion.prediction_source());
                    }
                    Status::Incomplete => {
                        incomplete = true;
                        predictions.extend(conversion.predictions().iter().cloned());
                    }
                    Status::Error => {}
                }
            }

            let text = arg.text();
            let dead_end = self.is_closed_domain() && !text.trim().is_empty() && predictions.is_empty();
            if incomplete && !dead_end {
                let message = if text.is_empty() { String::new() } else { cannot_use(&text) };
                Conversion::incomplete(arg.clone(), message).with_predictions(Predictions::ready(predictions))
            } else {
                Conversion::error(arg.clone(), cannot_use(&text))
            }
        })
    }

    fn stringify(&self, value: &TypedValue, context: &ExecutionContext) -> String {
        match value {
            TypedValue::Union { type_name, value } => self
                .alternatives
                .iter()
                .find(|alternative| alternative.name() == type_name)
                .map(|alternative| alternative.stringify(value, context))
                .unwrap_or_else(|| value.to_display_string()),
            other => other.to_display_string(),
        }
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        let alternatives = self
            .alternatives
            .iter()
            .map(|alternative| alternative.spec(command_name, param_name))
            .collect::<Vec<_>>();
        TypeSpec::inline("union", json!({ "alternatives": alternatives }))
    }

    fn is_closed_domain(&self) -> bool {
        !self.alternatives.is_empty() && self.alternatives.iter().all(|alternative| alternative.is_closed_domain())
    }
}
