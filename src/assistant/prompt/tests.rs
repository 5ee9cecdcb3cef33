use super::*;
use crate::database::lancedb::EntryMetadata;

fn hit(entry_index: u32, content: &str) -> SearchHit {
    SearchHit {
        metadata: EntryMetadata {
            entry_index,
            record_index: entry_index,
            chunk_index: 0,
            content: content.to_string(),
            category: "travel_tips".to_string(),
            source: "morocco_tourism_dataset".to_string(),
            instruction: String::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
        distance: 0.0,
        similarity_score: 1.0,
    }
}

#[test]
fn default_template_has_both_placeholders() {
    let template = PromptTemplate::default();

    assert!(template.as_str().contains(CONTEXT_PLACEHOLDER));
    assert!(template.as_str().contains(QUESTION_PLACEHOLDER));
    assert!(template.as_str().starts_with("You are an AI assistant specializing in Morocco tourism."));
}

#[test]
fn render_joins_context_with_blank_lines() {
    let template = PromptTemplate::new("C=[{context}] Q=[{question}]").expect("valid template");
    let hits = vec![hit(0, "first"), hit(1, "second"), hit(2, "third")];

    assert_eq!(
        template.render("When is Eid?", &hits),
        "C=[first\n\nsecond\n\nthird] Q=[When is Eid?]"
    );
}

#[test]
fn render_without_hits_leaves_context_empty() {
    let rendered = PromptTemplate::default().render("Do I need a visa?", &[]);

    assert!(rendered.contains("Context: \n"));
    assert!(rendered.contains("Question: Do I need a visa?"));
}

#[test]
fn inserted_text_is_not_treated_as_placeholder() {
    let template = PromptTemplate::new("{context}|{question}").expect("valid template");
    let hits = vec![hit(0, "literal {question} in data")];

    assert_eq!(
        template.render("why {context}?", &hits),
        "literal {question} in data|why {context}?"
    );
}

#[test]
fn template_without_placeholders_is_rejected() {
    assert!(PromptTemplate::new("Answer: {question}").is_none());
    assert!(PromptTemplate::new("Context: {context}").is_none());
}
