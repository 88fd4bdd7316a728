use vyve_core::{Citation, ReferenceDocument};

/// Question sent with the framework analysis when the prompt is empty.
const DEFAULT_QUESTION: &str = "Please analyze the provided documents.";

pub struct PhasePrompts;

impl PhasePrompts {
    pub fn question(prompt_text: &str) -> &str {
        if prompt_text.trim().is_empty() {
            DEFAULT_QUESTION
        } else {
            prompt_text
        }
    }

    /// Usable citations, highest score first, as numbered sections.
    pub fn citation_sections(citations: &[Citation]) -> String {
        let mut usable: Vec<&Citation> = citations.iter().filter(|c| c.is_usable()).collect();
        usable.sort_by(|a, b| b.score.total_cmp(&a.score));

        usable
            .iter()
            .enumerate()
            .map(|(i, citation)| {
                format!(
                    "Section {} [Relevance: {:.1}%]:\n{}",
                    i + 1,
                    citation.score * 100.0,
                    citation.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn frameworks(documents: &[ReferenceDocument]) -> String {
        documents
            .iter()
            .map(|doc| doc.content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Retrieved sections followed by the reference frameworks.
    pub fn analysis_context(sections: &str, frameworks: &str) -> String {
        match (sections.is_empty(), frameworks.is_empty()) {
            (_, true) => sections.to_string(),
            (true, false) => format!("Framework Context:\n{}", frameworks),
            (false, false) => format!("{}\n\nFramework Context:\n{}", sections, frameworks),
        }
    }

    /// System prompt for the framework analysis call. Later phases put the
    /// current instructions first and earlier results after them.
    pub fn phase_system(phase_number: i64, context: &str, previous_results: &str) -> String {
        if phase_number == 0 {
            return format!("=== Phase 0 Analysis Context ===\n\n{}", context);
        }

        let reference = if previous_results.trim().is_empty() {
            "No previous phase results available.\n".to_string()
        } else {
            format!(
                "{}\n----------------------------------------\n",
                previous_results.trim()
            )
        };

        format!(
            r#"=== Current Phase {phase} Instructions ===
{context}

=== Important Instructions for Current Phase ===
1. Focus primarily on the requirements specified in the Current Phase Instructions above
2. Use the previous phase results only as reference material
3. Structure your response exactly according to the output format specified in the current phase
4. Do not summarize previous phases - focus on completing the current phase's tasks
5. Maintain strict adherence to the current phase's output format requirements

=== Reference Material (Previous Phase Results) ===
{reference}"#,
            phase = phase_number,
            context = context,
            reference = reference
        )
    }

    pub fn previous_result(phase_number: i64, content: &str) -> String {
        format!("Phase {} Result:\n{}", phase_number, content)
    }

    pub fn format_verification(prompt_text: &str, analysis: &str) -> String {
        format!(
            r#"Please verify and adjust the following analysis to match the exact format specified in the original prompt:

Original Prompt:
{prompt}

Current Analysis:
{analysis}

Instructions:
1. Ensure the response follows the exact format specified in the original prompt
2. Maintain all insights and analysis while adjusting the format
3. Keep the same level of detail and accuracy
4. Return the reformatted analysis only"#,
            prompt = prompt_text,
            analysis = analysis
        )
    }

    pub fn final_verification(prompt_text: &str, answer: &str) -> String {
        format!(
            r#"Original Question: {question}
Generated Answer: {answer}

Please verify:
1. Does the answer directly address the original question?
2. Are all claims supported by the source documents?
3. Is the response appropriately focused and specific?
4. Are any important aspects of the question left unanswered?

Provide a verification score (0-100) and specific feedback."#,
            question = prompt_text,
            answer = answer
        )
    }

    pub fn adjustment(
        original_content: &str,
        key_findings: &[String],
        phase_name: &str,
        phase_description: &str,
        user_adjustment: &str,
    ) -> String {
        let findings = if key_findings.is_empty() {
            "No key findings provided".to_string()
        } else {
            key_findings.join("\n")
        };

        format!(
            "Original Analysis:\n{}\n\nKey Findings:\n{}\n\nPhase: {}\nDescription: {}\n\nUser Adjustment Request:\n{}",
            original_content, findings, phase_name, phase_description, user_adjustment
        )
    }

    pub fn findings_system() -> &'static str {
        "Extract key findings as bullet points. Output only the bullet points, one per line, starting with \"• \"."
    }

    pub fn findings_user(content: &str) -> String {
        format!("Extract key findings from:\n\n{}", content)
    }
}
