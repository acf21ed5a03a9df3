//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use statehouse_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```
/// use statehouse_core::reducer::on;
/// use statehouse_testing::ReducerTest;
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
///     Reset,
/// }
///
/// let increment = on(
///     |a: &CounterAction| matches!(a, CounterAction::Increment),
///     |n: &i32, _: &CounterAction| n + 1,
/// );
///
/// ReducerTest::new(increment)
///     .given_state(41)
///     .when_action(CounterAction::Increment)
///     .then_state(|n| assert_eq!(*n, 42))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    expect_match: Option<bool>,
    state_assertions: Vec<StateAssertion<R::State>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Action: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            action: None,
            expect_match: None,
            state_assertions: Vec::new(),
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    ///
    /// Implies the reducer is expected to accept the action.
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.expect_match = Some(true);
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the reducer to ignore the action (Then)
    #[must_use]
    pub const fn then_ignored(mut self) -> Self {
        self.expect_match = Some(false);
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state or action is not set, if the reducer's
    /// predicate disagrees with the expectation, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let matched = self.reducer.should_reduce(&action);
        if let Some(expected) = self.expect_match {
            assert_eq!(
                matched, expected,
                "Expected reducer to {} {action:?}",
                if expected { "accept" } else { "ignore" }
            );
        }
        if !matched {
            return;
        }

        // Execute reducer
        let next = self.reducer.reduce(&state, &action);

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statehouse_core::reducer::on;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    fn increment() -> impl Reducer<State = TestState, Action = TestAction> {
        on(
            |a: &TestAction| matches!(a, TestAction::Increment),
            |s: &TestState, _: &TestAction| TestState { count: s.count + 1 },
        )
    }

    #[test]
    fn test_reducer_test_builder() {
        ReducerTest::new(increment())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .run();
    }

    #[test]
    fn test_ignored_action() {
        ReducerTest::new(increment())
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .then_ignored()
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected reducer to accept")]
    fn test_unmatched_action_with_state_assertion_fails() {
        ReducerTest::new(increment())
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .then_state(|_| {})
            .run();
    }
}
