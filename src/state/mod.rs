// Approval state module
//
// This module provides the ApprovalController, the per-run state machine that
// mediates operator decisions on change plans. Its state is an explicit enum
// owned by the run loop; "approve all" carries across files through it.

use std::fmt;

/// Approval state for the remainder of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    /// Ask the operator for every non-empty plan
    Prompting,
    /// Apply every remaining plan without asking
    AutoApproveAll,
    /// Operator quit; no further files are processed
    Quitting,
}

/// Operator answer to a plan prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    All,
    Quit,
}

impl Answer {
    /// Parse an operator response. Anything that is not an explicit choice,
    /// including an empty line, is a No.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Answer::Yes,
            "a" | "all" => Answer::All,
            "q" | "quit" => Answer::Quit,
            _ => Answer::No,
        }
    }
}

/// What to do with the current file's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply,
    Discard,
    /// Discard this plan and stop visiting files
    Stop,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Apply => f.write_str("apply"),
            Verdict::Discard => f.write_str("discard"),
            Verdict::Stop => f.write_str("stop"),
        }
    }
}

/// Pure transition: current state plus answer gives the next state and verdict.
pub fn transition(state: ApprovalState, answer: Answer) -> (ApprovalState, Verdict) {
    match (state, answer) {
        (ApprovalState::Quitting, _) => (ApprovalState::Quitting, Verdict::Stop),
        (ApprovalState::AutoApproveAll, _) => (ApprovalState::AutoApproveAll, Verdict::Apply),
        (ApprovalState::Prompting, Answer::Yes) => (ApprovalState::Prompting, Verdict::Apply),
        (ApprovalState::Prompting, Answer::No) => (ApprovalState::Prompting, Verdict::Discard),
        (ApprovalState::Prompting, Answer::All) => (ApprovalState::AutoApproveAll, Verdict::Apply),
        (ApprovalState::Prompting, Answer::Quit) => (ApprovalState::Quitting, Verdict::Stop),
    }
}

/// Per-run approval state machine
///
/// # Usage
///
/// ```ignore
/// let mut approval = ApprovalController::new(false);
/// if approval.needs_prompt() {
///     let answer = Answer::parse(&console.ask("Apply? ")?);
///     approval.answer(answer);
/// } else {
///     approval.auto_verdict();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ApprovalController {
    state: ApprovalState,
}

impl ApprovalController {
    /// Start in `Prompting`, or in `AutoApproveAll` when `approve_all` is set.
    pub fn new(approve_all: bool) -> Self {
        let state = if approve_all {
            ApprovalState::AutoApproveAll
        } else {
            ApprovalState::Prompting
        };
        Self { state }
    }

    pub fn state(&self) -> ApprovalState {
        self.state
    }

    /// Whether the next plan has to be shown to the operator for a decision.
    pub fn needs_prompt(&self) -> bool {
        self.state == ApprovalState::Prompting
    }

    pub fn is_quitting(&self) -> bool {
        self.state == ApprovalState::Quitting
    }

    /// Verdict for a plan when no prompt is needed.
    pub fn auto_verdict(&self) -> Verdict {
        match self.state {
            ApprovalState::AutoApproveAll => Verdict::Apply,
            ApprovalState::Quitting => Verdict::Stop,
            // Never apply without an explicit answer
            ApprovalState::Prompting => Verdict::Discard,
        }
    }

    /// Feed an operator answer and get the verdict for the current plan.
    pub fn answer(&mut self, answer: Answer) -> Verdict {
        let (next, verdict) = transition(self.state, answer);
        if next != self.state {
            tracing::info!("Approval state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        verdict
    }
}

impl Default for ApprovalController {
    fn default() -> Self {
        Self::new(false)
    }
}
