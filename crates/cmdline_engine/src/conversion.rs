//! Results of converting argument text into typed values.

use std::{
    cell::{OnceCell, RefCell},
    fmt,
    rc::Rc,
};

use cmdline_contract::{PredictionItem, Status};
use cmdline_lexer::Argument;

use crate::value::{NodeHandle, TypedValue};

/// The input handed to a type's parser.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParamArg {
    /// Nothing was typed for the parameter.
    #[default]
    Blank,
    /// One argument.
    Single(Argument),
    /// Boolean switch given as `--name`.
    Flag(Argument),
    /// Several arguments collected by an array parameter.
    Array(Vec<Argument>),
}

impl ParamArg {
    /// Unescaped text the parser sees.
    pub fn text(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Single(argument) => argument.text.clone(),
            Self::Flag(_) => "true".to_string(),
            Self::Array(arguments) => arguments
                .iter()
                .map(|argument| argument.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Whether nothing was typed.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Single(argument) => argument.is_empty(),
            Self::Flag(_) => false,
            Self::Array(arguments) => arguments.is_empty(),
        }
    }

    /// Whether every underlying argument is lexically complete.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Single(argument) | Self::Flag(argument) => argument.is_closed(),
            Self::Array(arguments) => arguments.iter().all(Argument::is_closed),
        }
    }

    /// Underlying arguments in source order.
    pub fn arguments(&self) -> Vec<&Argument> {
        match self {
            Self::Blank => Vec::new(),
            Self::Single(argument) | Self::Flag(argument) => vec![argument],
            Self::Array(arguments) => arguments.iter().collect(),
        }
    }
}

/// A suggested completion for the argument being typed.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Text inserted on completion.
    pub name: String,
    /// Value the text converts to.
    pub value: TypedValue,
    /// Optional short description.
    pub description: Option<String>,
    /// Whether the prediction still needs more input.
    pub incomplete: bool,
}

impl Prediction {
    /// Prediction whose value is its own name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: TypedValue::String(name.clone()),
            name,
            description: None,
            incomplete: false,
        }
    }

    /// Prediction carrying a value.
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
            incomplete: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Wire form.
    pub fn to_item(&self) -> PredictionItem {
        PredictionItem {
            name: self.name.clone(),
            description: self.description.clone(),
            incomplete: self.incomplete,
        }
    }
}

type PredictionThunk = Box<dyn FnOnce() -> Vec<Prediction>>;

/// Predictions computed at most once, on first access.
#[derive(Clone)]
pub struct Predictions {
    cell: Rc<OnceCell<Vec<Prediction>>>,
    thunk: Rc<RefCell<Option<PredictionThunk>>>,
}

impl Predictions {
    /// No predictions.
    pub fn none() -> Self {
        Self::ready(Vec::new())
    }

    /// Predictions that are already known.
    pub fn ready(predictions: Vec<Prediction>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(predictions);
        Self {
            cell: Rc::new(cell),
            thunk: Rc::new(RefCell::new(None)),
        }
    }

    /// Predictions produced by `compute` the first time they are read.
    pub fn lazy(compute: impl FnOnce() -> Vec<Prediction> + 'static) -> Self {
        Self {
            cell: Rc::new(OnceCell::new()),
            thunk: Rc::new(RefCell::new(Some(Box::new(compute)))),
        }
    }

    /// Computes the predictions if needed and borrows them.
    pub fn get(&self) -> &[Prediction] {
        self.cell.get_or_init(|| {
            self.thunk
                .borrow_mut()
                .take()
                .map(|compute| compute())
                .unwrap_or_default()
        })
    }

    /// Whether the predictions were already computed.
    pub fn is_computed(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for Predictions {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Predictions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(predictions) => f.debug_list().entries(predictions).finish(),
            None => f.write_str("Predictions(<pending>)"),
        }
    }
}

/// The outcome of parsing one argument.
#[derive(Debug, Clone)]
pub struct Conversion {
    value: Option<TypedValue>,
    arg: ParamArg,
    status: Status,
    message: String,
    predictions: Predictions,
    matches: Option<Vec<NodeHandle>>,
}

impl Conversion {
    /// A successful conversion.
    pub fn valid(value: TypedValue, arg: ParamArg) -> Self {
        Self {
            value: Some(value),
            arg,
            status: Status::Valid,
            message: String::new(),
            predictions: Predictions::none(),
            matches: None,
        }
    }

    /// Input that could become valid with more typing.
    pub fn incomplete(arg: ParamArg, message: impl Into<String>) -> Self {
        Self {
            value: None,
            arg,
            status: Status::Incomplete,
            message: message.into(),
            predictions: Predictions::none(),
            matches: None,
        }
    }

    /// Input that cannot become valid by appending text.
    pub fn error(arg: ParamArg, message: impl Into<String>) -> Self {
        Self {
            value: None,
            arg,
            status: Status::Error,
            message: message.into(),
            predictions: Predictions::none(),
            matches: None,
        }
    }

    /// Attaches predictions.
    pub fn with_predictions(mut self, predictions: Predictions) -> Self {
        self.predictions = predictions;
        self
    }

    /// Attaches a value to a non-valid conversion.
    pub fn with_value(mut self, value: TypedValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches the elements a selector matched.
    pub fn with_matches(mut self, matches: Vec<NodeHandle>) -> Self {
        self.matches = Some(matches);
        self
    }

    /// Replaces status and message, keeping value and predictions.
    pub fn with_status(mut self, status: Status, message: impl Into<String>) -> Self {
        self.status = status;
        self.message = message.into();
        self
    }

    /// Converted value, absent when conversion failed.
    pub fn value(&self) -> Option<&TypedValue> {
        self.value.as_ref()
    }

    /// The argument that was converted.
    pub fn arg(&self) -> &ParamArg {
        &self.arg
    }

    /// Conversion status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Message explaining a non-valid status.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Predictions, computed on first access.
    pub fn predictions(&self) -> &[Prediction] {
        self.predictions.get()
    }

    /// Shared prediction handle.
    pub fn prediction_source(&self) -> Predictions {
        self.predictions.clone()
    }

    /// Elements a selector matched, for node-like types.
    pub fn matches(&self) -> Option<&[NodeHandle]> {
        self.matches.as_deref()
    }
}
