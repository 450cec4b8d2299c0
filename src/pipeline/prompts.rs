//! Prompt templates for the shipped pipeline stages.
//!
//! Plain formatting functions, one per generation call. The text here carries
//! no contractual semantics: stages work with whatever comes back and fall
//! back locally when a call fails, so rewording a template never changes
//! workflow behavior.

use crate::state::Critique;

/// Current date in the long form the templates embed ("August 22, 2026").
#[must_use]
pub fn current_date() -> String {
    chrono::Utc::now().format("%B %-d, %Y").to_string()
}

/// Planner prompt: decompose the question into researchable sub-topics.
#[must_use]
pub fn plan(question: &str) -> String {
    format!(
        "You are a research planner. Today is {date}.\n\
         \n\
         Break the following question into focused sub-topics that can be \
         researched independently. For each sub-topic provide a short name \
         and one or more concrete search queries.\n\
         \n\
         Question: {question}\n\
         \n\
         Respond with a research plan covering the question, the sub-topics, \
         and an overall depth estimate.",
        date = current_date(),
    )
}

/// Researcher prompt for one sub-topic of the plan.
#[must_use]
pub fn topic_research(topic: &str, queries: &[String]) -> String {
    format!(
        "You are a focused researcher. Today is {date}.\n\
         \n\
         Research the sub-topic below and write a dense, well-sourced summary \
         of what you find. Prefer primary and authoritative sources.\n\
         \n\
         Sub-topic: {topic}\n\
         Suggested queries:\n{queries}",
        date = current_date(),
        queries = bullet_list(queries),
    )
}

/// Synthesizer prompt: merge researched blocks into one draft report.
#[must_use]
pub fn synthesis(question: &str, findings: &str) -> String {
    format!(
        "You are a report writer. Synthesize the research below into a single \
         coherent markdown report that answers the question. Keep every \
         citation marker (like [s0.1]) exactly where its claim is used.\n\
         \n\
         Question: {question}\n\
         \n\
         Research:\n\n{findings}",
    )
}

/// Critique prompt: structured quality assessment of the draft.
#[must_use]
pub fn critique(draft: &str) -> String {
    format!(
        "You are a critical reviewer. Assess the draft report below: list its \
         strengths, its weaknesses, and concrete suggestions for improvement, \
         and state whether a revision pass is warranted.\n\
         \n\
         Draft:\n\n{draft}",
    )
}

/// Revision prompt: rework the draft guided by the critique.
#[must_use]
pub fn revision(draft: &str, critique: &Critique) -> String {
    format!(
        "You are a report editor. Improve the draft below according to the \
         critique. Keep the markdown structure and keep every citation marker \
         in place.\n\
         \n\
         Assessment: {assessment}\n\
         Suggestions:\n{suggestions}\n\
         \n\
         Draft:\n\n{draft}",
        assessment = critique.assessment,
        suggestions = bullet_list(&critique.suggestions),
    )
}

/// Query-writer prompt: initial search queries for the discovery preset.
#[must_use]
pub fn query_writer(question: &str, count: u32) -> String {
    format!(
        "You are a search specialist. Today is {date}.\n\
         \n\
         Write up to {count} diverse web search queries that together cover \
         the question below. Each query should stand alone and target a \
         distinct aspect.\n\
         \n\
         Question: {question}",
        date = current_date(),
    )
}

/// Web-search prompt for a single query.
#[must_use]
pub fn web_search(query: &str) -> String {
    format!(
        "You are a research assistant with web access. Today is {date}.\n\
         \n\
         Gather the most current, credible information for the query below \
         and summarize it faithfully. Track the source of every claim.\n\
         \n\
         Query: {query}",
        date = current_date(),
    )
}

/// Reflection prompt: sufficiency verdict over everything gathered so far.
#[must_use]
pub fn reflection(question: &str, summaries: &str) -> String {
    format!(
        "You are a research auditor. Today is {date}.\n\
         \n\
         Evaluate whether the summaries below are sufficient to answer the \
         question. If not, name the knowledge gap and write follow-up search \
         queries that would close it.\n\
         \n\
         Question: {question}\n\
         \n\
         Summaries:\n\n{summaries}",
        date = current_date(),
    )
}

/// Answer prompt: final report from the gathered summaries.
#[must_use]
pub fn answer(question: &str, summaries: &str) -> String {
    format!(
        "You are a report writer. Today is {date}.\n\
         \n\
         Write a complete markdown answer to the question using only the \
         research below. Keep every citation marker (like [s0.1]) attached to \
         the claim it supports.\n\
         \n\
         Question: {question}\n\
         \n\
         Research:\n\n{summaries}",
        date = current_date(),
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
