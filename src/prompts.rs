//! Prompt templates for the agent loop.

const FIRST_ITERATION_TEMPLATE: &str = "\
Look at the browser. It should show a search box with '{query}' already typed in.
Steps:
1. Press Enter key or click the search button next to the search box
2. Wait for search results to load
That's all for this step.";

const FOLLOW_UP_TEMPLATE: &str = "\
Look at the search results for '{query}'.
Steps:
1. Find and click on any news article about AI or artificial intelligence
2. If you already clicked an article, scroll down to read more of it";

/// Prompt for a 1-based iteration: finish the search first, then open an article.
pub fn prompt_for_iteration(index: u32, query: &str) -> String {
    let template = if index <= 1 {
        FIRST_ITERATION_TEMPLATE
    } else {
        FOLLOW_UP_TEMPLATE
    };
    template.replace("{query}", query)
}
