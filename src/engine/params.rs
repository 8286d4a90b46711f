//! Tunable parameters for smart-average computation.
//!
//! Parameters are locked from prototype validation against historical
//! evaluation data. Component weights and shrinkage strengths vary by
//! question: subjective quality questions lean on hierarchical priors, while
//! behavioral questions (attendance, workload) are course-specific enough
//! that priors are disabled and the course component is weighted up.

/// Per-question tunables resolved from the question text.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionParams {
    /// Weight of evidence from reports sharing a course.
    pub base_course: f64,
    /// Weight of evidence from reports sharing instructors.
    pub base_instructor: f64,
    /// Weight of evidence from reports sharing both.
    pub base_interaction: f64,
    /// Multiplicative boost coefficient for academic-career similarity.
    pub w_career: f64,
    /// Multiplicative boost coefficient for subject overlap.
    pub w_subject: f64,
    /// Per-year geometric decay of effective sample size, in (0, 1].
    pub decay: f64,
    /// Logarithmic dampener for course and instructor sample sizes;
    /// 0 disables dampening.
    pub dampening_k: f64,
    /// Shrinkage prior weight. `None` disables hierarchical priors for the
    /// question entirely (observed-only output).
    pub m: Option<f64>,
}

impl Default for QuestionParams {
    fn default() -> Self {
        QuestionParams {
            base_course: 1.0,
            base_instructor: 1.0,
            base_interaction: 1.0,
            w_career: 0.5,
            w_subject: 0.5,
            decay: 0.85,
            dampening_k: 1.0,
            m: Some(10.0),
        }
    }
}

impl QuestionParams {
    /// Parameters for behavioral questions (attendance, workload): priors
    /// off, evidence mass shifted onto the course component.
    fn course_specific() -> Self {
        QuestionParams {
            base_course: 2.0,
            base_instructor: 0.5,
            base_interaction: 0.25,
            m: None,
            ..QuestionParams::default()
        }
    }
}

/// Registry of global and per-question tunables.
#[derive(Debug, Clone)]
pub struct ParamRegistry {
    defaults: QuestionParams,
    per_question: Vec<(&'static str, QuestionParams)>,
}

impl ParamRegistry {
    /// The production parameter table.
    pub fn standard() -> Self {
        let defaults = QuestionParams::default();
        let per_question = vec![
            (
                "How would you describe the quality of the instruction in this course?",
                QuestionParams::default(),
            ),
            (
                "How much did you learn from this course?",
                QuestionParams::default(),
            ),
            (
                "How organized was this course?",
                QuestionParams::default(),
            ),
            (
                "What percentage of class sessions did you attend?",
                QuestionParams::course_specific(),
            ),
            (
                "How many hours per week on average did you spend on this course outside of scheduled class time?",
                QuestionParams::course_specific(),
            ),
        ];
        ParamRegistry {
            defaults,
            per_question,
        }
    }

    /// Build a registry with explicit overrides (used by tests and tuning
    /// experiments).
    pub fn with_overrides(
        defaults: QuestionParams,
        per_question: Vec<(&'static str, QuestionParams)>,
    ) -> Self {
        ParamRegistry {
            defaults,
            per_question,
        }
    }

    /// Resolve parameters for a question by its exact text, falling back to
    /// the defaults when no override matches.
    pub fn resolve(&self, question_text: &str) -> &QuestionParams {
        self.per_question
            .iter()
            .find(|(text, _)| *text == question_text)
            .map(|(_, params)| params)
            .unwrap_or(&self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_question_gets_defaults() {
        let registry = ParamRegistry::standard();
        let params = registry.resolve("Would you recommend this course?");
        assert_eq!(*params, QuestionParams::default());
        assert_eq!(params.m, Some(10.0));
    }

    #[test]
    fn test_behavioral_questions_disable_priors() {
        let registry = ParamRegistry::standard();
        let params = registry.resolve("What percentage of class sessions did you attend?");
        assert_eq!(params.m, None);
        assert_eq!(params.base_course, 2.0);
        assert_eq!(params.base_instructor, 0.5);
        assert_eq!(params.base_interaction, 0.25);
    }

    #[test]
    fn test_quality_question_uses_shrinkage() {
        let registry = ParamRegistry::standard();
        let params =
            registry.resolve("How would you describe the quality of the instruction in this course?");
        assert_eq!(params.m, Some(10.0));
        assert_eq!(params.base_course, 1.0);
    }
}
