//! Command-name matching and argument-to-parameter binding.

use std::rc::Rc;

use cmdline_contract::Status;
use cmdline_lexer::Argument;

use super::assignment::Binding;
use crate::{
    command::CommandSpec,
    conversion::{ParamArg, Prediction},
    registry::CommandRegistry,
    types::cannot_use,
    value::TypedValue,
};

/// What an argument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    /// Part of the command name.
    Command,
    /// Bound to the assignment at this index.
    Param(usize),
    /// Entry of the unassigned list at this index.
    Unassigned(usize),
    /// Trailing whitespace with nothing left to fill.
    Free,
}

/// The command-name part of the input.
#[derive(Debug, Clone)]
pub(crate) struct CommandPart {
    pub(crate) command: Option<Rc<CommandSpec>>,
    pub(crate) consumed: usize,
    pub(crate) status: Status,
    pub(crate) message: String,
    pub(crate) predictions: Vec<Prediction>,
}

/// An argument no parameter accepted.
#[derive(Debug, Clone)]
pub(crate) struct Unassigned {
    pub(crate) status: Status,
    pub(crate) message: String,
    pub(crate) predictions: Vec<Prediction>,
}

fn command_prediction(spec: &CommandSpec) -> Prediction {
    let prediction = Prediction::new(spec.name.clone(), TypedValue::String(spec.name.clone()));
    if spec.description.is_empty() {
        prediction
    } else {
        prediction.with_description(spec.description.clone())
    }
}

/// Matches the longest registered command name made of the leading arguments.
pub(crate) fn match_command(commands: &CommandRegistry, arguments: &[Argument]) -> CommandPart {
    let words = arguments
        .iter()
        .take_while(|argument| !argument.is_empty())
        .map(|argument| argument.text.as_str())
        .collect::<Vec<_>>();
    let visible = commands
        .commands()
        .into_iter()
        .filter(|spec| !spec.hidden)
        .collect::<Vec<_>>();
    let predict = |prefix: &str| {
        visible
            .iter()
            .filter(|spec| spec.name.starts_with(prefix))
            .map(|spec| command_prediction(spec))
            .collect::<Vec<_>>()
    };

    if words.is_empty() {
        return CommandPart {
            command: None,
            consumed: 0,
            status: Status::Incomplete,
            message: String::new(),
            predictions: predict(""),
        };
    }

    let exact = (1..=words.len())
        .rev()
        .find_map(|count| commands.get(&words[..count].join(" ")).map(|spec| (count, spec)));
    match exact {
        Some((count, spec)) if !spec.is_parent() => {
            let mut predictions = vec![command_prediction(&spec)];
            predictions.extend(
                predict(&spec.name)
                    .into_iter()
                    .filter(|prediction| prediction.name != spec.name),
            );
            CommandPart {
                command: Some(spec),
                consumed: count,
                status: Status::Valid,
                message: String::new(),
                predictions,
            }
        }
        Some((count, parent)) if count == words.len() => CommandPart {
            predictions: predict(&format!("{} ", parent.name)),
            command: Some(parent),
            consumed: count,
            status: Status::Incomplete,
            message: String::new(),
        },
        _ => {
            let typed_name = words.join(" ");
            let predictions = predict(&typed_name);
            let (status, message) = if predictions.is_empty() {
                (Status::Error, cannot_use(&typed_name))
            } else {
                (Status::Incomplete, String::new())
            };
            CommandPart {
                command: None,
                consumed: words.len(),
                status,
                message,
                predictions,
            }
        }
    }
}

fn named_body(argument: &Argument) -> Option<&str> {
    if argument.quote.is_some() {
        return None;
    }
    argument.text.strip_prefix("--")
}

fn inline_value(argument: &Argument, name: &str, value: &str) -> Argument {
    let start = (argument.text_start() + 2 + name.len() + 1).min(argument.end);
    Argument {
        text: value.to_string(),
        prefix: String::new(),
        source: value.to_string(),
        suffix: String::new(),
        start,
        end: argument.end,
        quote: None,
        state: argument.state,
    }
}

fn unknown_named(command: &CommandSpec, bindings: &[Option<Binding>], argument: &Argument, last: bool) -> Unassigned {
    let predictions = command
        .params
        .iter()
        .zip(bindings)
        .filter(|(param, binding)| !param.hidden && binding.is_none())
        .map(|(param, _)| format!("--{}", param.name))
        .filter(|option| option.starts_with(&argument.text))
        .map(Prediction::named)
        .collect::<Vec<_>>();
    let (status, message) = if last && !predictions.is_empty() {
        (Status::Incomplete, String::new())
    } else {
        (Status::Error, cannot_use(&argument.text))
    };
    Unassigned {
        status,
        message,
        predictions,
    }
}

/// Binds the arguments after the command name to `command`'s parameters.
///
/// Named arguments (`--name value`, `--name=value`, bare `--switch`) are taken first; the rest
/// fill positional parameters in order, an array parameter absorbing everything after it.
/// `owners` is indexed like `arguments` and receives the owner of every argument from `offset`.
pub(crate) fn bind(
    command: &CommandSpec,
    arguments: &[Argument],
    offset: usize,
    owners: &mut [Owner],
) -> (Vec<Binding>, Vec<Unassigned>) {
    let params = &command.params;
    let mut bindings: Vec<Option<Binding>> = vec![None; params.len()];
    let mut unassigned = Vec::new();
    let mut positional = Vec::new();

    let mut index = offset;
    while index < arguments.len() {
        let argument = &arguments[index];
        let Some(body) = named_body(argument) else {
            positional.push(index);
            index += 1;
            continue;
        };
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };
        let slot = params
            .iter()
            .position(|param| param.name == name)
            .filter(|slot| bindings[*slot].is_none());
        let Some(slot) = slot else {
            owners[index] = Owner::Unassigned(unassigned.len());
            let last = index + 1 == arguments.len();
            unassigned.push(unknown_named(command, &bindings, argument, last));
            index += 1;
            continue;
        };

        owners[index] = Owner::Param(slot);
        let binding = if let Some(value) = inline {
            Binding {
                arg: ParamArg::Single(inline_value(argument, name, value)),
                name_arg: Some(argument.clone()),
                missing_value: false,
            }
        } else if params[slot].is_switch() {
            Binding {
                arg: ParamArg::Flag(argument.clone()),
                name_arg: Some(argument.clone()),
                missing_value: false,
            }
        } else if let Some(next) = arguments.get(index + 1) {
            index += 1;
            owners[index] = Owner::Param(slot);
            Binding {
                arg: ParamArg::Single(next.clone()),
                name_arg: Some(argument.clone()),
                missing_value: next.is_empty(),
            }
        } else {
            Binding {
                arg: ParamArg::Blank,
                name_arg: Some(argument.clone()),
                missing_value: true,
            }
        };
        bindings[slot] = Some(binding);
        index += 1;
    }

    let slots = params
        .iter()
        .enumerate()
        .filter(|(slot, param)| param.is_positional() && bindings[*slot].is_none())
        .map(|(slot, _)| slot)
        .collect::<Vec<_>>();
    let mut next_slot = 0;
    let mut array: Option<(usize, Vec<Argument>)> = None;

    for index in positional {
        let argument = &arguments[index];
        if argument.is_empty() {
            owners[index] = match (&array, slots.get(next_slot)) {
                (Some((slot, _)), _) => Owner::Param(*slot),
                (None, Some(&slot)) => {
                    bindings[slot] = Some(Binding::positional(ParamArg::Single(argument.clone())));
                    Owner::Param(slot)
                }
                (None, None) => Owner::Free,
            };
            continue;
        }
        if let Some((slot, members)) = array.as_mut() {
            members.push(argument.clone());
            owners[index] = Owner::Param(*slot);
            continue;
        }
        match slots.get(next_slot) {
            Some(&slot) if params[slot].is_array() => {
                array = Some((slot, vec![argument.clone()]));
                owners[index] = Owner::Param(slot);
            }
            Some(&slot) => {
                bindings[slot] = Some(Binding::positional(ParamArg::Single(argument.clone())));
                owners[index] = Owner::Param(slot);
                next_slot += 1;
            }
            None => {
                owners[index] = Owner::Unassigned(unassigned.len());
                unassigned.push(Unassigned {
                    status: Status::Error,
                    message: "Too many arguments".to_string(),
                    predictions: Vec::new(),
                });
            }
        }
    }
    if let Some((slot, members)) = array {
        bindings[slot] = Some(Binding::positional(ParamArg::Array(members)));
    }

    (
        bindings.into_iter().map(Option::unwrap_or_default).collect(),
        unassigned,
    )
}
