//! Script-side state tracking for the CHTL-JS parser.
//!
//! A compact mirror of the CHTL state machinery: one stack, one guard
//! type released on drop, so the parser's state is restored on every
//! exit path.

use std::cell::RefCell;

/// Where the CHTL-JS parser currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptState {
    /// Before parsing starts.
    Initial,
    /// Inside the script body.
    Script,
    /// Inside `{{ ... }}`.
    EnhancedSelector,
    /// Inside a `vir` declaration.
    VirDeclaration,
    /// Inside a built-in function call.
    ChtlJsFunction,
    /// Inside raw JavaScript pass-through.
    JsFragment,
}

/// Stack-based state machine for script parsing.
pub struct ScriptStateMachine {
    stack: RefCell<Vec<ScriptState>>,
}

impl Default for ScriptStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptStateMachine {
    /// Create a machine in the `Initial` state.
    pub fn new() -> Self {
        Self {
            stack: RefCell::new(vec![ScriptState::Initial]),
        }
    }

    /// The state at the top of the stack.
    pub fn current(&self) -> ScriptState {
        self.stack
            .borrow()
            .last()
            .copied()
            .unwrap_or(ScriptState::Initial)
    }

    /// Nesting depth (the initial state does not count).
    pub fn depth(&self) -> usize {
        self.stack.borrow().len().saturating_sub(1)
    }

    /// Enter a state; the returned guard restores the previous state on
    /// drop.
    pub fn enter(&self, state: ScriptState) -> ScriptStateGuard<'_> {
        self.stack.borrow_mut().push(state);
        ScriptStateGuard { machine: self }
    }
}

/// Scope-bound state entry released on drop.
pub struct ScriptStateGuard<'a> {
    machine: &'a ScriptStateMachine,
}

impl Drop for ScriptStateGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.machine.stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_state_on_drop() {
        let machine = ScriptStateMachine::new();
        {
            let _script = machine.enter(ScriptState::Script);
            assert_eq!(machine.current(), ScriptState::Script);
            {
                let _sel = machine.enter(ScriptState::EnhancedSelector);
                assert_eq!(machine.current(), ScriptState::EnhancedSelector);
            }
            assert_eq!(machine.current(), ScriptState::Script);
        }
        assert_eq!(machine.current(), ScriptState::Initial);
    }

    #[test]
    fn initial_state_is_never_popped() {
        let machine = ScriptStateMachine::new();
        {
            let _g = machine.enter(ScriptState::Script);
        }
        assert_eq!(machine.depth(), 0);
        assert_eq!(machine.current(), ScriptState::Initial);
    }
}
