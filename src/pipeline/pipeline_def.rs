//! Pipeline definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::errors::ValidationError;
use crate::pipeline::steps::Step;
use crate::pipeline::types::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered list of steps executed once per platform run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Validate for Pipeline {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.steps.is_empty() {
            return Err(ValidationError::EmptyPipeline);
        }

        for step in &self.steps {
            step.validate()?;
        }

        Ok(())
    }
}

impl Pipeline {
    /// Creates a new pipeline builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Returns number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Finds a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({}): {} steps", self.name, self.steps.len())
    }
}

/// Builder for creating pipelines
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    /// Creates a builder for an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline {
                name: name.into(),
                steps: Vec::new(),
            },
        }
    }

    /// Appends a step
    pub fn step(mut self, step: Step) -> Self {
        self.pipeline.steps.push(step);
        self
    }

    /// Appends several steps
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.pipeline.steps.extend(steps);
        self
    }

    /// Builds and validates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn build(self) -> Result<Pipeline, ValidationError> {
        self.pipeline.validate()?;
        Ok(self.pipeline)
    }

    /// Builds without validation
    pub fn build_unchecked(self) -> Pipeline {
        self.pipeline
    }
}
