//! Instruction templates sent to the completion provider.

use super::index::SimilarityResult;

/// Section headings requested from the combine step, in order.
pub const SUMMARY_SECTIONS: [&str; 6] = [
    "Overall Summary",
    "Project Overview",
    "Technical Specifications",
    "Financial Breakdown",
    "Timeline & Deadlines",
    "Compliance Requirements",
];

/// Prompt summarizing a single normalized page.
pub fn page_summary_prompt(page_text: &str) -> String {
    format!(
        "Summarize this tender document page focusing on key points:\n{page_text}\n\nCONCISE SUMMARY:"
    )
}

/// Prompt condensing one batch of page summaries.
pub fn map_prompt(batch_text: &str) -> String {
    format!("Extract key structured details from these summaries:\n{batch_text}\n\nKEY DETAILS:")
}

/// Prompt folding every map output into the final structured overview.
pub fn combine_prompt(map_outputs: &[String]) -> String {
    let details = map_outputs.join("\n\n");
    let mut prompt = format!(
        "Combine these key details into a final structured overview:\n{details}\n\nStructure your response with:\n"
    );
    for section in SUMMARY_SECTIONS {
        prompt.push_str("- ");
        prompt.push_str(section);
        prompt.push('\n');
    }
    prompt
}

/// Prompt answering `question` from retrieved chunks, each shown with its similarity score.
pub fn answer_prompt(question: &str, evidence: &[SimilarityResult]) -> String {
    let context = evidence
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "Chunk {} (Similarity: {:.4}):\n{}",
                position + 1,
                hit.score,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following context, please provide a detailed answer to this question:\n\n\
         Question: {question}\n\n\
         Context:\n{context}\n\n\
         Instructions:\n\
         - Provide a clear and concise answer based on the given context\n\
         - If the context doesn't contain enough information, state that clearly\n\
         - Use specific information from the provided chunks when possible\n"
    )
}
