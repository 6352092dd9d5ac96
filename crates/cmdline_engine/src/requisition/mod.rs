//! The live session binding typed text to a matched command and its assignments.
//!
//! [`Requisition::update`] re-tokenizes, re-matches the command and rebinds the arguments
//! synchronously, then awaits conversions only for assignments whose argument changed. Every
//! update bumps a generation counter; conversions that complete after a newer update started are
//! dropped, as are conversions for an argument that no longer holds the text they were parsed
//! from.

mod assignment;
mod binding;
mod output;
mod state;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use cmdline_contract::{CursorRange, Status};
use cmdline_lexer::{argument_at, tokenize, Argument};
use futures::future::join_all;
use tracing::{debug, trace, warn};

pub use assignment::Assignment;
pub use output::Output;

use binding::{bind, match_command, CommandPart, Owner, Unassigned};

use crate::{
    command::{CommandArgs, CommandSpec},
    context::{Environment, ExecutionContext},
    conversion::{Conversion, ParamArg},
    error::{CommandError, RequisitionError},
    system::System,
    types::{DelegateContext, Type},
    value::TypedValue,
};

pub(crate) struct RequisitionState {
    typed: String,
    arguments: Vec<Argument>,
    owners: Vec<Owner>,
    command: CommandPart,
    epoch: u64,
    assignments: Vec<Assignment>,
    unassigned: Vec<Unassigned>,
    cursor: CursorRange,
}

impl RequisitionState {
    fn new(system: &System) -> Self {
        Self {
            typed: String::new(),
            arguments: Vec::new(),
            owners: Vec::new(),
            command: match_command(system.commands(), &[]),
            epoch: 0,
            assignments: Vec::new(),
            unassigned: Vec::new(),
            cursor: CursorRange::default(),
        }
    }

    fn status(&self) -> Status {
        Status::combine_all(
            std::iter::once(self.command.status)
                .chain(self.assignments.iter().map(Assignment::status))
                .chain(self.unassigned.iter().map(|unassigned| unassigned.status)),
        )
    }

    fn message(&self) -> String {
        let status = self.status();
        if status == Status::Valid {
            return String::new();
        }
        if self.command.status == status && !self.command.message.is_empty() {
            return self.command.message.clone();
        }
        self.assignments
            .iter()
            .filter(|assignment| assignment.status() == status)
            .map(Assignment::message)
            .chain(
                self.unassigned
                    .iter()
                    .filter(|unassigned| unassigned.status == status)
                    .map(|unassigned| unassigned.message.clone()),
            )
            .find(|message| !message.is_empty())
            .unwrap_or_default()
    }

    fn focus(&self) -> Option<(usize, Owner)> {
        let index = argument_at(&self.arguments, self.cursor.start)?;
        self.owners.get(index).map(|owner| (index, *owner))
    }
}

pub(crate) struct RequisitionInner {
    system: System,
    environment: Environment,
    state: RefCell<RequisitionState>,
    generation: Cell<u64>,
}

struct ParseJob {
    slot: usize,
    epoch: u64,
    param_type: Rc<dyn Type>,
    arg: ParamArg,
}

struct FocusTarget {
    epoch: u64,
    slot: usize,
    param_type: Rc<dyn Type>,
    conversion: Conversion,
}

/// A parse/execute session over one system.
///
/// Clones share the session. Calls on one session must not interleave; an `update` started
/// while another is awaiting conversions supersedes it.
#[derive(Clone)]
pub struct Requisition {
    inner: Rc<RequisitionInner>,
}

impl Requisition {
    /// Empty requisition over `system`; `environment` is handed to every execution context.
    pub fn new(system: System, environment: Environment) -> Self {
        let state = RequisitionState::new(&system);
        Self {
            inner: Rc::new(RequisitionInner {
                system,
                environment,
                state: RefCell::new(state),
                generation: Cell::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RequisitionInner>) -> Self {
        Self { inner }
    }

    /// System the requisition runs against.
    pub fn system(&self) -> &System {
        &self.inner.system
    }

    /// Ambient references supplied at construction.
    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    /// Current text.
    pub fn typed(&self) -> String {
        self.inner.state.borrow().typed.clone()
    }

    /// Current cursor.
    pub fn cursor(&self) -> CursorRange {
        self.inner.state.borrow().cursor
    }

    /// Overall status: the most severe of the command part, the assignments and any
    /// unassigned arguments.
    pub fn status(&self) -> Status {
        self.inner.state.borrow().status()
    }

    /// Message explaining the overall status, empty when valid.
    pub fn message(&self) -> String {
        self.inner.state.borrow().message()
    }

    /// Matched command. A parent command is reported even though it cannot execute.
    pub fn command(&self) -> Option<Rc<CommandSpec>> {
        self.inner.state.borrow().command.command.clone()
    }

    /// Assignment of the parameter called `name`.
    pub fn assignment(&self, name: &str) -> Option<Assignment> {
        self.inner
            .state
            .borrow()
            .assignments
            .iter()
            .find(|assignment| assignment.name() == name)
            .cloned()
    }

    /// All assignments in parameter order.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.inner.state.borrow().assignments.clone()
    }

    /// Like [`Requisition::assignment`], failing with
    /// [`RequisitionError::NoSuchParameter`].
    pub fn require_assignment(&self, name: &str) -> Result<Assignment, RequisitionError> {
        self.assignment(name).ok_or_else(|| RequisitionError::NoSuchParameter {
            command: self
                .command()
                .map(|command| command.name.clone())
                .unwrap_or_default(),
            param: name.to_string(),
        })
    }

    /// Context for parsing or executing against the current text.
    pub fn execution_context(&self) -> ExecutionContext {
        let typed = self.typed();
        ExecutionContext::attached(
            self.inner.environment.clone(),
            typed,
            self.inner.system.config().location,
            Rc::downgrade(&self.inner),
        )
    }

    /// Replaces the text and revalidates. The cursor moves to the end of the text.
    pub async fn update(&self, typed: &str) -> Status {
        let generation = self.inner.generation.get().wrapping_add(1);
        self.inner.generation.set(generation);

        let before = self.focus_target();
        let jobs = self.rebuild(typed);
        trace!(typed, generation, jobs = jobs.len(), "requisition update");

        let mut changed = self.run_jobs(generation, jobs).await;
        if self.is_current(generation) {
            let jobs = self.resolve_delegates();
            changed.extend(self.run_jobs(generation, jobs).await);
        }
        if self.is_current(generation) {
            self.fire_focus_hooks(before, &changed);
        }
        self.status()
    }

    /// Moves the cursor, running focus hooks of the parameters it leaves and enters.
    pub fn set_cursor(&self, cursor: CursorRange) {
        let before = self.focus_target();
        {
            let mut state = self.inner.state.borrow_mut();
            let length = state.typed.len();
            let start = cursor.start.min(length);
            state.cursor = CursorRange {
                start,
                end: cursor.end.clamp(start, length),
            };
        }
        self.fire_focus_hooks(before, &[]);
    }

    /// Steps the parameter's value up, rewriting the text. Returns the new argument text, or
    /// `None` when the type is not ordinal or is already at its bound.
    pub async fn increment(&self, param: &str) -> Result<Option<String>, RequisitionError> {
        self.step(param, true).await
    }

    /// Steps the parameter's value down; see [`Requisition::increment`].
    pub async fn decrement(&self, param: &str) -> Result<Option<String>, RequisitionError> {
        self.step(param, false).await
    }

    /// Executes the matched command with the construction environment.
    pub async fn exec(&self) -> Output {
        self.exec_with(Environment::new()).await
    }

    /// Executes the matched command; entries of `overrides` replace environment entries.
    ///
    /// Nothing runs unless the overall status is valid. Executor failures become error outputs.
    pub async fn exec_with(&self, overrides: Environment) -> Output {
        let (command, status, message, typed) = {
            let state = self.inner.state.borrow();
            (
                state.command.command.clone(),
                state.status(),
                state.message(),
                state.typed.clone(),
            )
        };
        let command_name = command.as_ref().map(|command| command.name.clone());
        let runnable = command
            .filter(|_| status == Status::Valid)
            .and_then(|command| command.executor_fn().cloned().map(|executor| (command, executor)));
        let Some((command, executor)) = runnable else {
            debug!(typed = %typed, %status, "refusing to execute");
            let message = if message.is_empty() {
                format!("'{}' is not a complete command.", typed.trim())
            } else {
                message
            };
            return Output::error(command_name, typed, message);
        };

        let context = ExecutionContext::attached(
            self.inner.environment.merged(&overrides),
            typed.clone(),
            self.inner.system.config().location,
            Rc::downgrade(&self.inner),
        );
        let mut args = CommandArgs::new();
        for assignment in self.inner.state.borrow().assignments.iter() {
            args.insert(assignment.name(), assignment.effective_value(&context));
        }

        debug!(command = %command.name, "executing command");
        let output = match executor(args, context.clone()).await {
            Ok(output) => output,
            Err(err) => {
                warn!(command = %command.name, error = %err, "command failed");
                let data = match err {
                    CommandError::Remote { data, .. } => TypedValue::from_json(data),
                    other => TypedValue::String(other.to_string()),
                };
                return Output {
                    command_name,
                    typed,
                    data,
                    type_name: "error".to_string(),
                    is_error: true,
                };
            }
        };

        let type_name = output
            .type_name
            .or_else(|| command.return_type.clone())
            .unwrap_or_else(|| output.value.type_name().to_string());
        let (data, type_name) = match self.inner.system.config().display_type.clone() {
            Some(display) => {
                let converted = self
                    .inner
                    .system
                    .converters()
                    .convert(output.value, &type_name, &display, &context)
                    .await;
                match converted {
                    Ok(converted) => (converted.value, converted.type_name),
                    Err(err) => {
                        warn!(command = %command.name, error = %err, "output conversion failed");
                        return Output::error(command_name, typed, err.to_string());
                    }
                }
            }
            None => (output.value, type_name),
        };
        debug!(command = %command.name, type_name = %type_name, "command finished");
        Output {
            command_name,
            typed,
            data,
            type_name,
            is_error: false,
        }
    }

    /// Updates with `typed` and executes.
    pub async fn update_exec(&self, typed: &str) -> Output {
        self.update(typed).await;
        self.exec().await
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.get() == generation
    }

    fn rebuild(&self, typed: &str) -> Vec<ParseJob> {
        let system = &self.inner.system;
        let arguments = tokenize(typed);
        let command = match_command(system.commands(), &arguments);
        let mut owners = vec![Owner::Free; arguments.len()];
        for owner in owners.iter_mut().take(command.consumed) {
            *owner = Owner::Command;
        }

        let mut state = self.inner.state.borrow_mut();
        let same_command = match (&state.command.command, &command.command) {
            (Some(previous), Some(next)) => Rc::ptr_eq(previous, next),
            (None, None) => true,
            _ => false,
        };
        let previous = if same_command {
            std::mem::take(&mut state.assignments)
        } else {
            state.epoch = state.epoch.wrapping_add(1);
            debug!(
                command = command.command.as_ref().map(|spec| spec.name.as_str()).unwrap_or(""),
                "requisition retargeted"
            );
            Vec::new()
        };

        let (assignments, unassigned) = match &command.command {
            Some(spec) => {
                let (bindings, unassigned) = bind(spec, &arguments, command.consumed, &mut owners);
                let mut previous = previous.into_iter();
                let assignments = spec
                    .params
                    .iter()
                    .zip(bindings)
                    .map(|(param, binding)| match previous.next() {
                        Some(assignment) => assignment.rebind(binding),
                        None => Assignment::new(param.clone(), system.types(), binding),
                    })
                    .collect::<Vec<_>>();
                (assignments, unassigned)
            }
            None => (Vec::new(), Vec::new()),
        };

        state.typed = typed.to_string();
        state.arguments = arguments;
        state.owners = owners;
        state.command = command;
        state.assignments = assignments;
        state.unassigned = unassigned;
        state.cursor = CursorRange {
            start: typed.len(),
            end: typed.len(),
        };

        let epoch = state.epoch;
        state
            .assignments
            .iter()
            .enumerate()
            .filter(|(_, assignment)| assignment.needs_parse())
            .filter_map(|(slot, assignment)| {
                Some(ParseJob {
                    slot,
                    epoch,
                    param_type: assignment.param_type()?.clone(),
                    arg: assignment.arg().clone(),
                })
            })
            .collect()
    }

    async fn run_jobs(&self, generation: u64, jobs: Vec<ParseJob>) -> Vec<usize> {
        if jobs.is_empty() {
            return Vec::new();
        }
        let context = self.execution_context();
        let conversions = join_all(jobs.iter().map(|job| job.param_type.parse(&job.arg, &context))).await;
        if !self.is_current(generation) {
            trace!(generation, "discarding superseded conversions");
            return Vec::new();
        }

        let mut state = self.inner.state.borrow_mut();
        let mut changed = Vec::new();
        for (job, conversion) in jobs.into_iter().zip(conversions) {
            if state.epoch != job.epoch {
                continue;
            }
            if let Some(assignment) = state.assignments.get_mut(job.slot) {
                if assignment.arg() == &job.arg {
                    assignment.set_conversion(conversion);
                    changed.push(job.slot);
                }
            }
        }
        changed
    }

    fn resolve_delegates(&self) -> Vec<ParseJob> {
        let context = self.execution_context();
        let types = self.inner.system.types().clone();
        let mut state = self.inner.state.borrow_mut();
        let Some(command) = state.command.command.clone() else {
            return Vec::new();
        };
        let epoch = state.epoch;

        let mut snapshot = CommandArgs::new();
        for assignment in state.assignments.iter().filter(|assignment| assignment.delegate().is_none()) {
            snapshot.insert(assignment.name(), assignment.effective_value(&context));
        }

        let mut jobs = Vec::new();
        for (slot, assignment) in state.assignments.iter_mut().enumerate() {
            let Some(placeholder) = assignment.delegate().cloned() else {
                continue;
            };
            if assignment.delegate_args() != Some(&snapshot) {
                let Some(delegate) = placeholder.as_delegate() else {
                    continue;
                };
                let outcome = delegate.resolve(&DelegateContext {
                    command_name: &command.name,
                    param_name: assignment.name(),
                    args: &snapshot,
                    types: &types,
                });
                trace!(command = %command.name, param = assignment.name(), ok = outcome.is_ok(), "resolved delegate");
                assignment.set_delegate_resolution(snapshot.clone(), outcome);
            }
            if assignment.needs_parse() {
                if let Some(param_type) = assignment.param_type() {
                    jobs.push(ParseJob {
                        slot,
                        epoch,
                        param_type: param_type.clone(),
                        arg: assignment.arg().clone(),
                    });
                }
            }
        }
        jobs
    }

    fn focus_target(&self) -> Option<FocusTarget> {
        let state = self.inner.state.borrow();
        let (_, Owner::Param(slot)) = state.focus()? else {
            return None;
        };
        let assignment = state.assignments.get(slot)?;
        Some(FocusTarget {
            epoch: state.epoch,
            slot,
            param_type: assignment.param_type()?.clone(),
            conversion: assignment.conversion()?.clone(),
        })
    }

    fn fire_focus_hooks(&self, before: Option<FocusTarget>, changed: &[usize]) {
        match (before, self.focus_target()) {
            (Some(before), Some(after)) if before.epoch == after.epoch && before.slot == after.slot => {
                if changed.contains(&after.slot) {
                    after.param_type.on_change(&after.conversion);
                }
            }
            (before, after) => {
                if let Some(before) = before {
                    before.param_type.on_blur(&before.conversion);
                }
                if let Some(after) = after {
                    after.param_type.on_focus(&after.conversion);
                }
            }
        }
    }

    async fn step(&self, param: &str, forward: bool) -> Result<Option<String>, RequisitionError> {
        let assignment = self.require_assignment(param)?;
        let Some(param_type) = assignment.param_type().cloned() else {
            return Ok(None);
        };
        let context = self.execution_context();
        let current = if assignment.is_blank() {
            assignment.param().default_value.clone()
        } else {
            assignment.value().cloned()
        };
        let next = if forward {
            param_type.increment(current.as_ref(), &context).await
        } else {
            param_type.decrement(current.as_ref(), &context).await
        };
        let Some(next) = next else {
            return Ok(None);
        };

        let text = param_type.stringify(&next, &context);
        let typed = replace_argument(&self.typed(), &assignment, &text);
        self.update(&typed).await;
        Ok(Some(text))
    }
}

/// Rewrites the text so that the assignment's argument reads `text`.
fn replace_argument(typed: &str, assignment: &Assignment, text: &str) -> String {
    if let ParamArg::Single(argument) = assignment.arg() {
        if let (Some(head), Some(tail)) = (typed.get(..argument.start), typed.get(argument.end..)) {
            let replacement = Argument::from_value(text, argument.whitespace());
            return format!("{head}{}{tail}", replacement.to_source());
        }
    }

    let mut line = typed.to_string();
    let separator = |line: &str| if line.is_empty() || line.ends_with(char::is_whitespace) { "" } else { " " };
    if !assignment.param().is_positional() && assignment.name_arg().is_none() {
        let space = separator(&line);
        line.push_str(space);
        line.push_str("--");
        line.push_str(assignment.name());
    }
    let space = separator(&line);
    line.push_str(&Argument::from_value(text, space).to_source());
    line
}
