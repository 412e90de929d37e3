//! Bounded review/test feedback loop as a pure state machine.
//!
//! The orchestrator asks the loop which step to run next and reports each
//! verdict back. The loop owns the iteration counter: it starts at 1, moves
//! forward once per fix step, and ends the loop once it passes
//! `max_iterations`.

use crate::core::types::{CycleStop, Role, Verdict};

/// Next step the orchestrator should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Review,
    Test,
    /// Run the implementer on the output of the failed `after` step.
    Fix { after: Role },
    Finish(CycleStop),
}

#[derive(Debug, Clone)]
pub struct FeedbackLoop {
    max_iterations: u32,
    iteration: u32,
}

impl FeedbackLoop {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iteration: 1,
        }
    }

    /// Current iteration (1-indexed).
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// First action on loop entry.
    pub fn start(&self) -> LoopAction {
        if self.iteration > self.max_iterations {
            return LoopAction::Finish(CycleStop::Exhausted {
                iterations: self.max_iterations,
            });
        }
        LoopAction::Review
    }

    pub fn after_review(&self, verdict: Verdict) -> LoopAction {
        match verdict {
            Verdict::Pass => LoopAction::Test,
            Verdict::Fail => LoopAction::Fix {
                after: Role::Reviewer,
            },
        }
    }

    pub fn after_test(&self, verdict: Verdict) -> LoopAction {
        match verdict {
            Verdict::Pass => LoopAction::Finish(CycleStop::Converged {
                iterations: self.iteration,
            }),
            Verdict::Fail => LoopAction::Fix {
                after: Role::Tester,
            },
        }
    }

    /// Count the fix and either re-enter review or stop.
    pub fn after_fix(&mut self) -> LoopAction {
        self.iteration += 1;
        self.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the loop with scripted verdicts and return the steps taken.
    fn drive(max: u32, verdicts: &[Verdict]) -> (Vec<LoopAction>, CycleStop) {
        let mut feedback = FeedbackLoop::new(max);
        let mut verdicts = verdicts.iter().copied().cycle();
        let mut taken = Vec::new();
        let mut action = feedback.start();
        loop {
            match action {
                LoopAction::Finish(stop) => return (taken, stop),
                LoopAction::Review => {
                    taken.push(action);
                    action = feedback.after_review(verdicts.next().unwrap_or(Verdict::Fail));
                }
                LoopAction::Test => {
                    taken.push(action);
                    action = feedback.after_test(verdicts.next().unwrap_or(Verdict::Fail));
                }
                LoopAction::Fix { .. } => {
                    taken.push(action);
                    action = feedback.after_fix();
                }
            }
        }
    }

    #[test]
    fn both_pass_first_iteration_converges_without_fixes() {
        let (taken, stop) = drive(5, &[Verdict::Pass, Verdict::Pass]);
        assert_eq!(taken, vec![LoopAction::Review, LoopAction::Test]);
        assert_eq!(stop, CycleStop::Converged { iterations: 1 });
    }

    #[test]
    fn review_failure_triggers_fix_then_re_review() {
        let mut feedback = FeedbackLoop::new(5);
        assert_eq!(feedback.start(), LoopAction::Review);
        assert_eq!(
            feedback.after_review(Verdict::Fail),
            LoopAction::Fix {
                after: Role::Reviewer
            }
        );
        assert_eq!(feedback.after_fix(), LoopAction::Review);
        assert_eq!(feedback.iteration(), 2);
    }

    #[test]
    fn test_failure_returns_to_review_after_fix() {
        let mut feedback = FeedbackLoop::new(5);
        assert_eq!(feedback.after_review(Verdict::Pass), LoopAction::Test);
        assert_eq!(
            feedback.after_test(Verdict::Fail),
            LoopAction::Fix {
                after: Role::Tester
            }
        );
        assert_eq!(feedback.after_fix(), LoopAction::Review);
    }

    #[test]
    fn always_failing_review_exhausts_after_max_iterations() {
        let (taken, stop) = drive(5, &[Verdict::Fail]);
        let reviews = taken.iter().filter(|a| **a == LoopAction::Review).count();
        assert_eq!(reviews, 5);
        assert_eq!(taken.len(), 10);
        assert_eq!(stop, CycleStop::Exhausted { iterations: 5 });
    }

    #[test]
    fn zero_max_iterations_finishes_immediately() {
        let (taken, stop) = drive(0, &[Verdict::Pass]);
        assert!(taken.is_empty());
        assert_eq!(stop, CycleStop::Exhausted { iterations: 0 });
    }

    #[test]
    fn loop_is_bounded_for_every_verdict_sequence() {
        // Enumerate every verdict pattern of length 8 and check the bound.
        for max in 1..=4u32 {
            for bits in 0u32..256 {
                let verdicts: Vec<Verdict> = (0..8)
                    .map(|i| {
                        if bits & (1 << i) != 0 {
                            Verdict::Pass
                        } else {
                            Verdict::Fail
                        }
                    })
                    .collect();
                let (taken, stop) = drive(max, &verdicts);
                let fixes = taken
                    .iter()
                    .filter(|a| matches!(a, LoopAction::Fix { .. }))
                    .count();
                let reviews = taken.iter().filter(|a| **a == LoopAction::Review).count();
                assert!(fixes <= max as usize, "max={max} bits={bits:#010b}");
                assert!(reviews <= max as usize, "max={max} bits={bits:#010b}");
                assert!(taken.len() <= 3 * max as usize);
                assert!(stop.iterations() <= max);
            }
        }
    }
}
