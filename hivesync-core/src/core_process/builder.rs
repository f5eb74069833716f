//! Assemble a process from steps and an initial context

use super::context::{ProcessContext, Slot};
use super::env::ExecutionEnv;
use super::process::Process;
use super::step::ProcessStep;

/// Builder for a process whose root is a sequential group
///
/// # Example
/// ```ignore
/// let process = ProcessBuilder::new("upload")
///     .seed(KEYS, keys)
///     .step(ProcessStep::get("get", target, FETCHED))
///     .fork("parallel", vec![put_a, put_b])
///     .build(env);
/// ```
pub struct ProcessBuilder {
    name: String,
    steps: Vec<ProcessStep>,
    context: ProcessContext,
}

impl ProcessBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProcessBuilder { name: name.into(), steps: Vec::new(), context: ProcessContext::new() }
    }

    /// Append one step
    pub fn step(mut self, step: ProcessStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a fork group
    pub fn fork(mut self, name: impl Into<String>, members: Vec<ProcessStep>) -> Self {
        self.steps.push(ProcessStep::fork(name, members));
        self
    }

    /// Append a nested sequential group
    pub fn sequence(mut self, name: impl Into<String>, steps: Vec<ProcessStep>) -> Self {
        self.steps.push(ProcessStep::sequence(name, steps));
        self
    }

    /// Put a value in the initial context
    pub fn seed<T: Send + 'static>(self, slot: Slot<T>, value: T) -> Self {
        self.context.seed(slot, value);
        self
    }

    pub fn build(self, env: ExecutionEnv) -> Process {
        let root = ProcessStep::sequence(self.name.clone(), self.steps);
        Process::new(self.name, root, env.with_context(self.context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_process::data_steps::DigestExpectation;
    use crate::core_dht::{ContentAddress, Target};
    use crate::test_utils::TestNetwork;

    #[tokio::test]
    async fn test_builder_layout() {
        const COUNT: Slot<u32> = Slot::new("count");
        let network = TestNetwork::new();
        let target = Target::all(ContentAddress::hashed("location", "content"));

        let process = ProcessBuilder::new("layout")
            .seed(COUNT, 1)
            .step(ProcessStep::digest("first", target, DigestExpectation::Any))
            .fork(
                "parallel",
                vec![
                    ProcessStep::digest("a", target, DigestExpectation::Any),
                    ProcessStep::digest("b", target, DigestExpectation::Any),
                ],
            )
            .sequence("tail", vec![ProcessStep::digest("c", target, DigestExpectation::Empty)])
            .build(network.env());

        let root = process.root().unwrap();
        assert_eq!(root.name(), "layout");
        assert_eq!(root.children().len(), 3);
        assert_eq!(root.find("parallel").unwrap().children().len(), 2);
        assert!(process.context().contains(COUNT));
    }
}
