use cmdline_contract::{CursorRange, StateData, Status, StatusSpan};
use cmdline_lexer::Argument;

use super::{binding::Owner, Requisition, RequisitionState};
use crate::conversion::Prediction;

const NBSP: char = '\u{a0}';
const TAB_ARROW: &str = "\u{21E5} ";

impl Requisition {
    /// Snapshot for a client input widget with the cursor at `start`.
    ///
    /// `rank` counts how often the user cycled through predictions; it wraps in both
    /// directions.
    pub fn state_data(&self, start: usize, rank: i64) -> StateData {
        self.set_cursor(CursorRange { start, end: start });
        let max_predictions = self.inner.system.config().max_predictions;
        let state = self.inner.state.borrow();
        let focus = state.focus();

        let mut predictions = focus_predictions(&state, focus);
        if let Some(max) = max_predictions {
            predictions.truncate(max);
        }
        let ranked = match predictions.len() {
            0 => None,
            count => usize::try_from(rank.rem_euclid(count as i64))
                .ok()
                .and_then(|index| predictions.get(index)),
        };

        let (existing, end) = focus_text(&state, focus);
        let direct_tab_text = match ranked {
            Some(prediction) if state.cursor.start == end && prediction.name.starts_with(&existing) => {
                prediction.name[existing.len()..].to_string()
            }
            _ => String::new(),
        };
        let arrow_tab_text = match ranked {
            Some(prediction) if direct_tab_text.is_empty() && prediction.name != existing => {
                format!("{TAB_ARROW}{}", prediction.name)
            }
            _ => String::new(),
        };

        let message = match focus.map(|(_, owner)| owner) {
            Some(Owner::Command) => state.command.message.clone(),
            Some(Owner::Param(slot)) => state
                .assignments
                .get(slot)
                .map(|assignment| assignment.message())
                .unwrap_or_default(),
            Some(Owner::Unassigned(index)) => state
                .unassigned
                .get(index)
                .map(|unassigned| unassigned.message.clone())
                .unwrap_or_default(),
            Some(Owner::Free) | None => String::new(),
        };
        let message = if message.is_empty() { state.message() } else { message };

        let current_param = match focus {
            Some((_, Owner::Param(slot))) => state.assignments.get(slot).map(|assignment| assignment.name().to_string()),
            _ => None,
        };

        StateData {
            typed: state.typed.clone(),
            cursor: state.cursor,
            status: state.status(),
            status_markup: status_markup(&state),
            direct_tab_text,
            arrow_tab_text,
            empty_parameters: empty_parameters(&state),
            message,
            predictions: predictions.iter().map(Prediction::to_item).collect(),
            current_param,
        }
    }
}

fn focus_predictions(state: &RequisitionState, focus: Option<(usize, Owner)>) -> Vec<Prediction> {
    match focus {
        None | Some((_, Owner::Command)) => state.command.predictions.clone(),
        Some((_, Owner::Param(slot))) => state
            .assignments
            .get(slot)
            .map(|assignment| assignment.predictions().to_vec())
            .unwrap_or_default(),
        Some((_, Owner::Unassigned(index))) => state
            .unassigned
            .get(index)
            .map(|unassigned| unassigned.predictions.clone())
            .unwrap_or_default(),
        Some((index, Owner::Free)) => {
            if state.command.status != Status::Valid {
                return state.command.predictions.clone();
            }
            let text = state
                .arguments
                .get(index)
                .map(|argument| argument.text.as_str())
                .unwrap_or_default();
            state
                .assignments
                .iter()
                .filter(|assignment| {
                    let param = assignment.param();
                    !param.hidden && !param.is_positional() && assignment.is_blank()
                })
                .map(|assignment| format!("--{}", assignment.name()))
                .filter(|option| option.starts_with(text))
                .map(Prediction::named)
                .collect()
        }
    }
}

/// Text being completed under the cursor, and the offset where it ends.
fn focus_text(state: &RequisitionState, focus: Option<(usize, Owner)>) -> (String, usize) {
    match focus {
        None => (String::new(), state.typed.len()),
        Some((_, Owner::Command)) => {
            let last = state.command.consumed.saturating_sub(1);
            match (state.arguments.first(), state.arguments.get(last)) {
                (Some(first), Some(last)) => (
                    state
                        .typed
                        .get(first.text_start()..last.end)
                        .unwrap_or_default()
                        .to_string(),
                    last.end,
                ),
                _ => (String::new(), state.typed.len()),
            }
        }
        Some((index, _)) => state
            .arguments
            .get(index)
            .map(|argument| (argument.text.clone(), argument.end))
            .unwrap_or_else(|| (String::new(), state.typed.len())),
    }
}

fn empty_parameters(state: &RequisitionState) -> Vec<String> {
    if state.command.status != Status::Valid || state.cursor.start < state.typed.len() {
        return Vec::new();
    }

    let mut hints = Vec::new();
    let mut options = false;
    for assignment in &state.assignments {
        let param = assignment.param();
        if param.hidden {
            continue;
        }
        if assignment.is_missing_value() {
            let type_name = assignment
                .param_type()
                .map(|param_type| param_type.name().to_string())
                .unwrap_or_else(|| "value".to_string());
            hints.push(format!("<{type_name}>{NBSP}"));
        } else if !assignment.is_blank() {
            continue;
        } else if param.is_positional() {
            if param.required {
                hints.push(format!("<{}>{NBSP}", param.name));
            } else {
                hints.push(format!("[{}]{NBSP}", param.name));
            }
        } else {
            options = true;
        }
    }
    if options {
        hints.push(format!("[options]{NBSP}"));
    }

    if !state.typed.ends_with(char::is_whitespace) {
        if let Some(first) = hints.first_mut() {
            first.insert(0, NBSP);
        }
    }
    hints
}

fn status_markup(state: &RequisitionState) -> Vec<StatusSpan> {
    let mut spans: Vec<StatusSpan> = Vec::new();
    let mut push = |text: &str, status: Status| {
        if text.is_empty() {
            return;
        }
        match spans.last_mut() {
            Some(last) if last.status == status => last.string.push_str(text),
            _ => spans.push(StatusSpan {
                string: text.to_string(),
                status,
            }),
        }
    };

    for (argument, owner) in state.arguments.iter().zip(&state.owners) {
        let status = owner_status(state, *owner);
        let (whitespace, body) = split_source(&state.typed, argument);
        push(whitespace, Status::Valid);
        push(body, status);
    }
    spans
}

fn owner_status(state: &RequisitionState, owner: Owner) -> Status {
    match owner {
        Owner::Command => state.command.status,
        Owner::Param(slot) => state
            .assignments
            .get(slot)
            .map(|assignment| assignment.status())
            .unwrap_or(Status::Valid),
        Owner::Unassigned(index) => state
            .unassigned
            .get(index)
            .map(|unassigned| unassigned.status)
            .unwrap_or(Status::Valid),
        Owner::Free if state.command.command.is_none() => state.command.status,
        Owner::Free => Status::Valid,
    }
}

fn split_source<'a>(typed: &'a str, argument: &Argument) -> (&'a str, &'a str) {
    let split = argument.start + argument.whitespace().len();
    (
        typed.get(argument.start..split).unwrap_or_default(),
        typed.get(split..argument.end).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{CommandSpec, ParamSpec},
        config::SystemConfig,
        context::Environment,
        system::System,
    };
    use cmdline_contract::TypeSpec;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    fn system(config: SystemConfig) -> System {
        let system = System::new(config);
        let commands = system.commands();
        commands.register(CommandSpec::new("addon", "Manage add-ons")).expect("addon");
        for name in ["addon enable", "addon disable"] {
            commands
                .register(
                    CommandSpec::new(name, "")
                        .param(ParamSpec::new("name", TypeSpec::selection(["Adblock", "Bar Addon", "Cookies"])))
                        .exec(|_args, _context| async { Ok("ok".into()) }),
                )
                .expect("addon child");
        }
        commands
            .register(
                CommandSpec::new("count", "")
                    .param(ParamSpec::new("from", "number"))
                    .param(ParamSpec::new("to", "number").optional())
                    .group("Options", vec![ParamSpec::new("loud", "boolean")])
                    .exec(|_args, _context| async { Ok("ok".into()) }),
            )
            .expect("count");
        system
    }

    fn state(typed: &str, rank: i64) -> StateData {
        let requisition = Requisition::new(system(SystemConfig::server()), Environment::new());
        block_on(requisition.update(typed));
        requisition.state_data(typed.len(), rank)
    }

    fn names(data: &StateData) -> Vec<&str> {
        data.predictions.iter().map(|prediction| prediction.name.as_str()).collect()
    }

    #[test]
    fn partial_command_names_complete_directly() {
        let data = state("addon en", 0);
        assert_eq!(data.status, Status::Incomplete);
        assert_eq!(names(&data), vec!["addon enable"]);
        assert_eq!(data.direct_tab_text, "able");
        assert_eq!(data.arrow_tab_text, "");
    }

    #[test]
    fn rank_cycles_through_parameter_predictions() {
        assert_eq!(state("addon enable ", 0).direct_tab_text, "Adblock");
        assert_eq!(state("addon enable ", 1).direct_tab_text, "Bar Addon");
        assert_eq!(state("addon enable ", 3).direct_tab_text, "Adblock");
        assert_eq!(state("addon enable ", -1).direct_tab_text, "Cookies");

        let data = state("addon enable ", 0);
        assert_eq!(names(&data), vec!["Adblock", "Bar Addon", "Cookies"]);
        assert_eq!(data.current_param.as_deref(), Some("name"));
    }

    #[test]
    fn case_insensitive_matches_use_the_arrow() {
        let data = state("addon enable bar", 0);
        assert_eq!(data.status, Status::Valid);
        assert_eq!(data.direct_tab_text, "");
        assert_eq!(data.arrow_tab_text, "\u{21E5} Bar Addon");
    }

    #[test]
    fn markup_marks_the_failing_argument() {
        let data = state("addon enable Foo", 0);
        assert_eq!(data.status, Status::Error);
        assert_eq!(
            data.status_markup,
            vec![
                StatusSpan {
                    string: "addon enable ".into(),
                    status: Status::Valid
                },
                StatusSpan {
                    string: "Foo".into(),
                    status: Status::Error
                },
            ]
        );
        assert_eq!(data.message, "Can't use 'Foo'.");
        assert!(data.predictions.is_empty());
    }

    #[test]
    fn empty_parameters_hint_what_is_left() {
        assert_eq!(state("addon enable", 0).empty_parameters, vec!["\u{a0}<name>\u{a0}".to_string()]);
        assert_eq!(
            state("count 1 ", 0).empty_parameters,
            vec!["[to]\u{a0}".to_string(), "[options]\u{a0}".to_string()]
        );
        assert_eq!(state("count 1 2 --loud", 0).empty_parameters, Vec::<String>::new());
        assert_eq!(state("addon", 0).empty_parameters, Vec::<String>::new());
    }

    #[test]
    fn free_arguments_predict_unused_options() {
        let data = state("count 1 2 ", 0);
        assert_eq!(names(&data), vec!["--loud"]);
        assert_eq!(data.direct_tab_text, "--loud");

        let parent = state("addon ", 0);
        assert_eq!(names(&parent), vec!["addon enable", "addon disable"]);
    }

    #[test]
    fn predictions_respect_the_configured_maximum() {
        let config = SystemConfig {
            max_predictions: Some(2),
            ..SystemConfig::server()
        };
        let requisition = Requisition::new(system(config), Environment::new());
        block_on(requisition.update("addon enable "));
        let data = requisition.state_data(13, 2);
        assert_eq!(names(&data), vec!["Adblock", "Bar Addon"]);
        assert_eq!(data.direct_tab_text, "Adblock");
    }

    #[test]
    fn cursor_on_the_command_reports_command_state() {
        let requisition = Requisition::new(system(SystemConfig::server()), Environment::new());
        block_on(requisition.update("addon enable Foo"));
        let data = requisition.state_data(3, 0);
        assert_eq!(data.cursor, CursorRange { start: 3, end: 3 });
        assert_eq!(data.current_param, None);
        assert_eq!(data.message, "Can't use 'Foo'.");
        assert_eq!(data.direct_tab_text, "");
    }
}
