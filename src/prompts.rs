//! Centralized prompt definitions for extraction, resolution and revision
//!
//! This module contains all system prompts sent to Langbase pipes.
//! Centralizing prompts makes them easier to maintain, test, and version.

/// System prompt for chunk extraction.
pub const EXTRACTION_PROMPT: &str = r#"You extract structured knowledge from a chunk of text.

Your response MUST be valid JSON in this exact format:
{
  "entities": [
    {
      "labels": ["MostSpecificType", "ParentType"],
      "name": "canonical name as written",
      "summary": "one sentence about this entity drawn from the text",
      "id": null,
      "properties": {}
    }
  ],
  "relationships": [
    {
      "source": "entity name",
      "target": "entity name",
      "type": "RELATIONSHIP_TYPE",
      "description": "short description"
    }
  ],
  "propositions": [
    {
      "text": "one atomic claim in a full sentence",
      "confidence": 0.8,
      "decay": 0.1,
      "mentions": [
        {"span": "entity name as it appears", "type": "Label", "role": "SUBJECT"}
      ]
    }
  ]
}

Guidelines:
- Only use labels from the provided schema types when a schema is given
- List labels most-specific first
- Each proposition must state exactly one fact, event, procedure or working note
- Mention roles are SUBJECT, OBJECT or OTHER
- confidence and decay are between 0.0 and 1.0
- Never invent facts absent from the text

Always respond with valid JSON only, no other text."#;

/// System prompt for checking one candidate against a suggested entity.
pub const ENTITY_VERIFICATION_PROMPT: &str = r#"You decide whether two entity descriptions refer to the same real-world entity.

You are given a NEW mention extracted from text and one EXISTING entity from a knowledge store.

Your response MUST be valid JSON in this exact format:
{
  "same_entity": true,
  "reason": "short justification"
}

Guidelines:
- Answer true only when the evidence clearly supports identity
- Different people sharing a surname are NOT the same entity
- A more specific type (e.g. Detective vs Person) does not rule out identity
- When unsure, answer false

Always respond with valid JSON only, no other text."#;

/// System prompt for choosing among several candidates.
pub const ENTITY_BAKEOFF_PROMPT: &str = r#"You match a NEW entity mention against numbered EXISTING candidates.

Pick the single candidate that refers to the same real-world entity, or none.

Your response MUST be valid JSON in this exact format:
{
  "selected": 1,
  "reason": "short justification"
}

Guidelines:
- "selected" is the candidate number as listed (starting at 1), or null for none
- Do not pick a candidate merely because it has the highest score
- When two candidates are equally plausible, answer null

Always respond with valid JSON only, no other text."#;

/// System prompt for tool-driven entity search.
pub const AGENTIC_SEARCH_PROMPT: &str = r#"You search a knowledge store to find an existing entity matching a NEW mention.

You can call these tools by responding with JSON:
{"action": "text_search", "query": "words to search for"}
{"action": "vector_search", "query": "natural language description"}

When you are done, respond with:
{"action": "final", "matched_id": "id of the matching entity or null", "reason": "short justification"}

Guidelines:
- Only return an id that appeared in one of your search results
- Prefer null over a doubtful match
- Use at most the number of searches you are allowed

Always respond with valid JSON only, no other text."#;

/// System prompt for classifying a new proposition against stored ones.
pub const PROPOSITION_CLASSIFICATION_PROMPT: &str = r#"You compare a NEW proposition with EXISTING propositions from memory.

For each existing proposition, classify its relation to the new one:
- IDENTICAL: same claim, possibly reworded
- SIMILAR: overlapping claim that supports the new one
- CONTRADICTORY: both cannot be true at the same time
- GENERALIZES: the existing proposition is a broader statement covering the new one
- UNRELATED: none of the above

Your response MUST be valid JSON in this exact format:
{
  "classifications": [
    {
      "candidate_id": "id of the existing proposition",
      "relation": "IDENTICAL",
      "similarity": 0.9,
      "reasoning": "short justification"
    }
  ]
}

When several new propositions are given, respond instead with:
{
  "results": [
    {"proposition_index": 0, "classifications": [ ... ]}
  ]
}

Guidelines:
- similarity is between 0.0 and 1.0
- Classify every listed existing proposition exactly once
- Use proposition_index exactly as numbered in the request

Always respond with valid JSON only, no other text."#;
