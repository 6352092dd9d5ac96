use std::{cell::RefCell, cmp::Ordering, fmt, future::Future, rc::Rc};

use cmdline_contract::TypeSpec;
use futures::future::LocalBoxFuture;
use serde::Deserialize;
use serde_json::Value;

use super::{cannot_use, Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg, Prediction, Predictions},
    error::TypeError,
    value::TypedValue,
};

/// One selectable entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupEntry {
    /// Text the user types.
    pub name: String,
    /// Value the text converts to.
    pub value: TypedValue,
    /// Optional short description.
    pub description: Option<String>,
}

impl LookupEntry {
    /// Entry with an explicit value.
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    /// Entry whose value is its own name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), TypedValue::String(name))
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn prediction(&self) -> Prediction {
        Prediction {
            name: self.name.clone(),
            value: self.value.clone(),
            description: self.description.clone(),
            incomplete: false,
        }
    }
}

/// Async source of selection entries, such as the installed add-ons.
pub type LookupFn =
    Rc<dyn Fn(&ExecutionContext) -> LocalBoxFuture<'static, Result<Vec<LookupEntry>, TypeError>>>;

/// Orders prefix matches when dataset order is not wanted.
pub type Comparator = Rc<dyn Fn(&LookupEntry, &LookupEntry) -> Ordering>;

#[derive(Clone)]
enum SelectionSource {
    Static(Rc<Vec<LookupEntry>>),
    Lookup(LookupFn),
}

/// Options of the `selection` factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    /// Entry names, each converting to itself.
    pub data: Vec<String>,
}

/// Choice from a static dataset or an async lookup.
///
/// Text is matched by prefix, falling back to a case-insensitive prefix. Matches keep dataset
/// order unless a comparator is set.
#[derive(Clone)]
pub struct SelectionType {
    name: String,
    source: SelectionSource,
    comparator: Option<Comparator>,
    last_entries: Rc<RefCell<Option<Rc<Vec<LookupEntry>>>>>,
}

impl SelectionType {
    /// Selection over plain names.
    pub fn from_data<I, S>(data: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(data.into_iter().map(LookupEntry::named).collect())
    }

    /// Selection over entries carrying values.
    pub fn from_entries(entries: Vec<LookupEntry>) -> Self {
        Self::with_source(SelectionSource::Static(Rc::new(entries)))
    }

    /// Selection whose entries are fetched on every parse.
    pub fn with_lookup<F, Fut>(lookup: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Fut + 'static,
        Fut: Future<Output = Result<Vec<LookupEntry>, TypeError>> + 'static,
    {
        let lookup: LookupFn = Rc::new(
            move |context: &ExecutionContext| -> LocalBoxFuture<'static, Result<Vec<LookupEntry>, TypeError>> {
                Box::pin(lookup(context))
            },
        );
        Self::with_source(SelectionSource::Lookup(lookup))
    }

    fn with_source(source: SelectionSource) -> Self {
        Self {
            name: "selection".into(),
            source,
            comparator: None,
            last_entries: Rc::new(RefCell::new(None)),
        }
    }

    pub(crate) fn from_options(options: SelectionOptions) -> Self {
        Self::from_data(options.data)
    }

    /// Renames the type, for registering it as a named type such as `addon`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Orders prefix matches with `comparator`.
    pub fn with_comparator(mut self, comparator: impl Fn(&LookupEntry, &LookupEntry) -> Ordering + 'static) -> Self {
        self.comparator = Some(Rc::new(comparator));
        self
    }

    async fn entries(&self, context: &ExecutionContext) -> Result<Rc<Vec<LookupEntry>>, TypeError> {
        let entries = match &self.source {
            SelectionSource::Static(entries) => entries.clone(),
            SelectionSource::Lookup(lookup) => Rc::new(lookup(context).await?),
        };
        *self.last_entries.borrow_mut() = Some(entries.clone());
        Ok(entries)
    }

    fn known_entries(&self) -> Option<Rc<Vec<LookupEntry>>> {
        match &self.source {
            SelectionSource::Static(entries) => Some(entries.clone()),
            SelectionSource::Lookup(_) => self.last_entries.borrow().clone(),
        }
    }

    fn matching(&self, entries: &[LookupEntry], text: &str) -> Vec<LookupEntry> {
        let mut matches = entries
            .iter()
            .filter(|entry| entry.name.starts_with(text))
            .cloned()
            .collect::<Vec<_>>();
        if matches.is_empty() {
            let lowered = text.to_lowercase();
            matches = entries
                .iter()
                .filter(|entry| entry.name.to_lowercase().starts_with(&lowered))
                .cloned()
                .collect();
        }
        if let Some(comparator) = &self.comparator {
            matches.sort_by(|left, right| comparator(left, right));
        }
        matches
    }

    pub(crate) fn convert(&self, arg: &ParamArg, entries: Rc<Vec<LookupEntry>>) -> Conversion {
        let text = arg.text();
        if text.is_empty() {
            let comparator = self.comparator.clone();
            return Conversion::incomplete(arg.clone(), "").with_predictions(Predictions::lazy(move || {
                let mut all = entries.iter().cloned().collect::<Vec<_>>();
                if let Some(comparator) = comparator {
                    all.sort_by(|left, right| comparator(left, right));
                }
                all.iter().map(LookupEntry::prediction).collect()
            }));
        }

        let matches = self.matching(&entries, &text);
        let exact = entries.iter().find(|entry| entry.name == text);
        if let Some(exact) = exact {
            let predictions = matches.iter().map(LookupEntry::prediction).collect();
            return Conversion::valid(exact.value.clone(), arg.clone())
                .with_predictions(Predictions::ready(predictions));
        }

        match matches.len() {
            0 => Conversion::incomplete(arg.clone(), cannot_use(&text)),
            1 => Conversion::valid(matches[0].value.clone(), arg.clone())
                .with_predictions(Predictions::ready(vec![matches[0].prediction()])),
            _ => Conversion::incomplete(arg.clone(), "").with_predictions(Predictions::lazy(move || {
                matches.iter().map(LookupEntry::prediction).collect()
            })),
        }
    }

    fn step(entries: &[LookupEntry], value: Option<&TypedValue>, forward: bool) -> Option<TypedValue> {
        let position = value.and_then(|value| entries.iter().position(|entry| &entry.value == value));
        let entry = match (position, forward) {
            (None, true) => entries.first(),
            (None, false) => entries.last(),
            (Some(index), true) => entries.get(index + 1).or_else(|| entries.get(index)),
            (Some(index), false) => index
                .checked_sub(1)
                .and_then(|previous| entries.get(previous))
                .or_else(|| entries.get(index)),
        };
        entry.map(|entry| entry.value.clone())
    }
}

impl fmt::Debug for SelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            SelectionSource::Static(entries) => format!("static({})", entries.len()),
            SelectionSource::Lookup(_) => "lookup".to_string(),
        };
        f.debug_struct("SelectionType")
            .field("name", &self.name)
            .field("source", &source)
            .finish_non_exhaustive()
    }
}

impl Type for SelectionType {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        Box::pin(async move {
            match self.entries(context).await {
                Ok(entries) => self.convert(arg, entries),
                Err(err) => Conversion::error(arg.clone(), err.to_string()),
            }
        })
    }

    fn stringify(&self, value: &TypedValue, _context: &ExecutionContext) -> String {
        self.known_entries()
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|entry| &entry.value == value)
                    .map(|entry| entry.name.clone())
            })
            .unwrap_or_else(|| value.to_display_string())
    }

    fn increment<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async move {
            let entries = self.entries(context).await.ok()?;
            Self::step(&entries, value, true)
        })
    }

    fn decrement<'a>(
        &'a self,
        value: Option<&'a TypedValue>,
        context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async move {
            let entries = self.entries(context).await.ok()?;
            Self::step(&entries, value, false)
        })
    }

    fn lookup<'a>(&'a self, context: &'a ExecutionContext) -> TypeFuture<'a, Result<Vec<LookupEntry>, TypeError>> {
        Box::pin(async move { Ok(self.entries(context).await?.as_ref().clone()) })
    }

    fn data<'a>(&'a self, context: &'a ExecutionContext) -> TypeFuture<'a, Result<Value, TypeError>> {
        Box::pin(async move {
            let entries = self.entries(context).await?;
            Ok(Value::Array(
                entries
                    .iter()
                    .map(|entry| Value::String(entry.name.clone()))
                    .collect(),
            ))
        })
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        match &self.source {
            SelectionSource::Static(entries)
                if entries
                    .iter()
                    .all(|entry| entry.value.as_str() == Some(entry.name.as_str())) =>
            {
                TypeSpec::selection(entries.iter().map(|entry| entry.name.clone()))
            }
            _ => TypeSpec::remote(command_name, param_name),
        }
    }

    fn is_closed_domain(&self) -> bool {
        true
    }
}
