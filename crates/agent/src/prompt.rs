//! Prompt assembly: the fixed instruction preamble, the agent profile, the
//! replayed conversation, and the follow-up message that carries fetched data.

use leadline_core::message::{ConversationMemory, Message};
use leadline_core::profile::AgentProfile;

/// Who the assistant is and how answers are formatted.
pub const SYSTEM_PREAMBLE: &str = "You are a helpful real estate assistant working with agent \
{agent_name} in {location}. Their current listings are: {listings}.\n\n\
Provide the answers in a Markdown format";

/// Query mode: ask for data with a single FETCH line.
pub const QUERY_INSTRUCTIONS: &str = "You operate in two modes:\n\
1. Query Mode – When you do NOT yet have homeowner or prospect data:\n\
   • Respond ONLY in the format:  FETCH: <users query>\n\
   • Follow these rules:\n\
     - Never include full street addresses or commas.\n\
     - Use only a suburb or postcode.\n\
     - Don't use suburb and postcode together.\n\
     - Output nothing except the single FETCH line.\n";

/// Analysis mode: summarise data already in the conversation.
pub const ANALYSIS_INSTRUCTIONS: &str = "2. Analysis Mode – When the user provides homeowner or \
prospect data (you will see text like 'Here are the search results...' or 'Data:' in the \
conversation):\n\
   • Do NOT use FETCH again.\n\
   • Analyse the provided data and summarise key opportunities for the agent, \
including a table of the data with the following columns: Name, Address, Phone, Email, \
and any other relevant information such as potential leads, timing, or market insights.\n";

/// Render the system message for a profile.
pub fn system_prompt(profile: &AgentProfile) -> String {
    let preamble = SYSTEM_PREAMBLE
        .replace("{agent_name}", &profile.agent_name)
        .replace("{location}", &profile.location)
        .replace("{listings}", &profile.listings_text());
    format!("{preamble}\n\n{QUERY_INSTRUCTIONS}{ANALYSIS_INSTRUCTIONS}")
}

/// Build the full prompt for one invocation: system preamble, every
/// remembered turn in order, then the new user text.
pub fn compose_messages(
    profile: &AgentProfile,
    memory: &ConversationMemory,
    user_text: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(memory.len() + 2);
    messages.push(Message::system(system_prompt(profile)));
    messages.extend(memory.turns().iter().cloned());
    messages.push(Message::user(user_text));
    messages
}

/// The message that hands fetched data back to the model.
pub fn follow_up(query: &str, data: &str) -> String {
    format!(
        "Here are the search results for '{query}': {data}\n\
         Please summarise the key opportunities for the agent."
    )
}

/// Text substituted for data when the fetch itself failed.
pub fn fetch_error_text(error: &impl std::fmt::Display) -> String {
    format!("Error fetching data: {error}")
}
