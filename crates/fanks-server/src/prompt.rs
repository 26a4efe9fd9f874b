use rand::seq::SliceRandom;

/// Writing prompts offered above the note form.
pub const PROMPTS: &[&str] = &[
    "What made you smile today?",
    "Who helped you out recently?",
    "What is something small you are grateful for?",
    "What went better than you expected today?",
    "Which person would you like to thank, and why?",
    "What is a comfort you often take for granted?",
    "What did you learn today that you are glad to know?",
    "What part of your day would you happily repeat?",
    "What is something about where you live that you appreciate?",
    "Who made your week a little easier?",
];

pub fn random_prompt() -> &'static str {
    PROMPTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PROMPTS[0])
}

/// The prompt to show: a non-blank `requested` one, or a random one.
pub fn prompt_or_random(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_owned(),
        _ => random_prompt().to_owned(),
    }
}
