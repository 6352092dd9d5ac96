use std::rc::Rc;

use cmdline_contract::TypeSpec;
use serde::Deserialize;
use thiserror::Error;

use super::{Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    value::{NodeHandle, NodeList, ResourceKind, ResourceRef, TypedValue},
};

/// Selector text the host document could not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Syntax error in CSS query `{selector}`: {message}")]
pub struct SelectorError {
    /// Offending selector.
    pub selector: String,
    /// Host-provided detail.
    pub message: String,
}

/// The document node-like types query. Implemented by the host.
pub trait DocumentHost {
    /// Elements matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeHandle>, SelectorError>;

    /// Resources of `kind` loaded by the document.
    fn resources(&self, _kind: ResourceKind) -> Vec<ResourceRef> {
        Vec::new()
    }
}

/// Visual overlay for the elements of the parameter under the cursor. Implemented by the host.
pub trait Highlighter {
    /// Shows the overlay over `nodes`, replacing any previous one.
    fn highlight(&self, nodes: &[NodeHandle]);

    /// Removes the overlay.
    fn clear(&self);
}

fn highlight(highlighter: &Option<Rc<dyn Highlighter>>, conversion: &Conversion) {
    if let Some(highlighter) = highlighter {
        highlighter.highlight(conversion.matches().unwrap_or_default());
    }
}

fn clear(highlighter: &Option<Rc<dyn Highlighter>>) {
    if let Some(highlighter) = highlighter {
        highlighter.clear();
    }
}

/// Exactly one element located by a selector.
#[derive(Clone)]
pub struct NodeType {
    host: Rc<dyn DocumentHost>,
    highlighter: Option<Rc<dyn Highlighter>>,
}

impl NodeType {
    /// Node type over `host`.
    pub fn new(host: Rc<dyn DocumentHost>, highlighter: Option<Rc<dyn Highlighter>>) -> Self {
        Self { host, highlighter }
    }

    fn convert(&self, arg: &ParamArg) -> Conversion {
        let text = arg.text();
        if text.trim().is_empty() {
            return Conversion::incomplete(arg.clone(), "");
        }
        match self.host.query_selector_all(&text) {
            Err(err) => Conversion::error(arg.clone(), err.to_string()),
            Ok(nodes) => match nodes.len() {
                0 => Conversion::incomplete(arg.clone(), "No matches").with_matches(nodes),
                1 => {
                    let node = nodes[0].clone().with_query(text.clone());
                    Conversion::valid(TypedValue::Node(node), arg.clone()).with_matches(nodes)
                }
                count => Conversion::error(arg.clone(), format!("Too many matches ({count})")).with_matches(nodes),
            },
        }
    }
}

impl Type for NodeType {
    fn name(&self) -> &str {
        "node"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        let conversion = self.convert(arg);
        Box::pin(async move { conversion })
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        TypeSpec::remote(command_name, param_name)
    }

    fn on_focus(&self, conversion: &Conversion) {
        highlight(&self.highlighter, conversion);
    }

    fn on_change(&self, conversion: &Conversion) {
        highlight(&self.highlighter, conversion);
    }

    fn on_blur(&self, _conversion: &Conversion) {
        clear(&self.highlighter);
    }
}

/// Options of the `nodelist` factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeListOptions {
    /// Accept a selector matching nothing.
    pub allow_empty: bool,
}

/// Any number of elements located by a selector.
#[derive(Clone)]
pub struct NodeListType {
    host: Rc<dyn DocumentHost>,
    highlighter: Option<Rc<dyn Highlighter>>,
    allow_empty: bool,
}

impl NodeListType {
    /// Node-list type over `host`.
    pub fn new(host: Rc<dyn DocumentHost>, highlighter: Option<Rc<dyn Highlighter>>, allow_empty: bool) -> Self {
        Self {
            host,
            highlighter,
            allow_empty,
        }
    }

    pub(crate) fn from_options(
        host: Rc<dyn DocumentHost>,
        highlighter: Option<Rc<dyn Highlighter>>,
        options: NodeListOptions,
    ) -> Self {
        Self::new(host, highlighter, options.allow_empty)
    }

    fn convert(&self, arg: &ParamArg) -> Conversion {
        let text = arg.text();
        if text.trim().is_empty() {
            return Conversion::valid(TypedValue::NodeList(NodeList::default()), arg.clone());
        }
        match self.host.query_selector_all(&text) {
            Err(err) => Conversion::error(arg.clone(), err.to_string()),
            Ok(nodes) if nodes.is_empty() && !self.allow_empty => {
                Conversion::incomplete(arg.clone(), "No matches").with_matches(nodes)
            }
            Ok(nodes) => {
                let list = NodeList {
                    query: text,
                    nodes: nodes.clone(),
                };
                Conversion::valid(TypedValue::NodeList(list), arg.clone()).with_matches(nodes)
            }
        }
    }
}

impl Type for NodeListType {
    fn name(&self) -> &str {
        "nodelist"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        let conversion = self.convert(arg);
        Box::pin(async move { conversion })
    }

    fn blank_value(&self, _context: &ExecutionContext) -> Option<TypedValue> {
        Some(TypedValue::NodeList(NodeList::default()))
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        TypeSpec::remote(command_name, param_name)
    }

    fn on_focus(&self, conversion: &Conversion) {
        highlight(&self.highlighter, conversion);
    }

    fn on_change(&self, conversion: &Conversion) {
        highlight(&self.highlighter, conversion);
    }

    fn on_blur(&self, _conversion: &Conversion) {
        clear(&self.highlighter);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{config::Location, context::Environment};
    use cmdline_contract::Status;
    use cmdline_lexer::tokenize;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::BTreeMap};

    /// Document with a fixed selector table; `!` makes a selector invalid.
    #[derive(Default)]
    pub(crate) struct FakeDocument {
        pub(crate) elements: BTreeMap<String, Vec<NodeHandle>>,
        pub(crate) resources: Vec<ResourceRef>,
    }

    impl FakeDocument {
        pub(crate) fn with(mut self, selector: &str, count: usize) -> Self {
            let nodes = (0..count)
                .map(|index| NodeHandle::new(Rc::new(format!("{selector}#{index}"))))
                .collect();
            self.elements.insert(selector.to_string(), nodes);
            self
        }
    }

    impl DocumentHost for FakeDocument {
        fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeHandle>, SelectorError> {
            if selector.contains('!') {
                return Err(SelectorError {
                    selector: selector.to_string(),
                    message: "unexpected `!`".into(),
                });
            }
            Ok(self.elements.get(selector).cloned().unwrap_or_default())
        }

        fn resources(&self, kind: ResourceKind) -> Vec<ResourceRef> {
            self.resources
                .iter()
                .filter(|resource| resource.kind == kind)
                .cloned()
                .collect()
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingHighlighter {
        pub(crate) events: RefCell<Vec<String>>,
    }

    impl Highlighter for RecordingHighlighter {
        fn highlight(&self, nodes: &[NodeHandle]) {
            self.events.borrow_mut().push(format!("highlight {}", nodes.len()));
        }

        fn clear(&self) {
            self.events.borrow_mut().push("clear".into());
        }
    }

    fn parse(kind: &dyn Type, text: &str) -> Conversion {
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let arg = tokenize(&format!("n {text}"))
            .get(1)
            .cloned()
            .map(ParamArg::Single)
            .unwrap_or(ParamArg::Blank);
        block_on(kind.parse(&arg, &context))
    }

    fn document() -> Rc<dyn DocumentHost> {
        Rc::new(FakeDocument::default().with("#one", 1).with("p", 3))
    }

    #[test]
    fn node_requires_exactly_one_match() {
        let node = NodeType::new(document(), None);
        let none = parse(&node, "#missing");
        assert_eq!(none.status(), Status::Incomplete);
        assert_eq!(none.message(), "No matches");

        let one = parse(&node, "#one");
        assert_eq!(one.status(), Status::Valid);
        assert_eq!(
            one.value().map(TypedValue::to_json),
            Some(serde_json::json!({ "query": "#one" }))
        );

        let many = parse(&node, "p");
        assert_eq!(many.status(), Status::Error);
        assert!(many.message().contains('3'));
        assert_eq!(parse(&node, "p!").status(), Status::Error);
    }

    #[test]
    fn node_list_accepts_any_count() {
        let strict = NodeListType::new(document(), None, false);
        assert_eq!(parse(&strict, "").status(), Status::Valid);
        assert_eq!(parse(&strict, "#missing").status(), Status::Incomplete);
        assert_eq!(parse(&strict, "p").status(), Status::Valid);
        assert_eq!(parse(&strict, "p!").status(), Status::Error);

        let lenient = NodeListType::new(document(), None, true);
        assert_eq!(parse(&lenient, "#missing").status(), Status::Valid);
    }

    #[test]
    fn highlighter_follows_focus() {
        let recorder = Rc::new(RecordingHighlighter::default());
        let node = NodeType::new(document(), Some(recorder.clone()));
        let conversion = parse(&node, "p");
        node.on_focus(&conversion);
        node.on_change(&parse(&node, "#one"));
        node.on_blur(&conversion);
        assert_eq!(
            *recorder.events.borrow(),
            vec!["highlight 3".to_string(), "highlight 1".into(), "clear".into()]
        );
    }
}
