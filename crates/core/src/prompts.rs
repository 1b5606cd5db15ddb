//! Prompt assembly for the generation calls.
//!
//! Static system-prompt bases live in template files loaded at startup;
//! the functions here render the dynamic sections (persona profiles,
//! lesson context, conversation history) that get appended to them.

use crate::context::{ConversationMessage, DEFAULT_GRADE_LEVEL, LessonContext, PersonaApproach};
use crate::coordinator::PersonaResponse;
use crate::persona::{Persona, PersonaCatalog};
use std::fmt::Write;

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the full system prompt for one persona's generation call.
///
/// Combines the trait profile, the persona's derived approach (when the
/// lesson context carries one), the shared history, and the grade-level
/// framing. With no context, [`DEFAULT_GRADE_LEVEL`] flows through the
/// identical template.
pub fn persona_system_prompt(
    persona: &Persona,
    context: Option<&LessonContext>,
    history: &[ConversationMessage],
) -> String {
    let grade = context
        .map(|ctx| ctx.grade_level.as_str())
        .unwrap_or(DEFAULT_GRADE_LEVEL);

    let mut prompt = format!(
        "You are {name}, a {grade} math student with the following characteristics:\n\n\
         LEARNING STYLE: {style}\n\
         DESCRIPTION: {description}\n\n\
         STRENGTHS:\n{strengths}\n\n\
         CHALLENGES:\n{challenges}\n\n\
         THINKING APPROACH:\n{thinking}\n\n\
         CONFIDENCE LEVEL: {confidence}/1.0\n\
         PARTICIPATION WILLINGNESS: {participation}/1.0\n\
         PROCESSING SPEED: {speed}\n\n\
         TYPICAL RESPONSE PATTERNS:\n{patterns}\n",
        name = persona.name,
        grade = grade,
        style = persona.learning_style,
        description = persona.description,
        strengths = bullet_list(&persona.strengths),
        challenges = bullet_list(&persona.challenges),
        thinking = persona.thinking_approach,
        confidence = persona.traits.confidence_level,
        participation = persona.traits.participation_willingness,
        speed = persona.traits.processing_speed,
        patterns = bullet_list(&persona.response_patterns),
    );

    if let Some(ctx) = context {
        let _ = write!(
            prompt,
            "\nLESSON CONTEXT:\n\
             Grade Level: {}\n\
             Subject: {}\n\
             Topic: {}\n\n\
             Learning Objectives:\n{}\n\n\
             Key Concepts:\n{}\n\n\
             Context: {}\n",
            ctx.grade_level,
            ctx.subject,
            ctx.topic,
            bullet_list(&ctx.learning_objectives),
            bullet_list(&ctx.key_concepts),
            ctx.context_summary,
        );
        if let Some(problem) = &ctx.mathematical_problem {
            let _ = write!(prompt, "\nProblem under discussion: {}\n", problem);
        }
        if let Some(approach) = ctx.persona_approaches.get(&persona.id) {
            let _ = write!(prompt, "\n{}", persona_approach_block(approach));
        }
        let _ = write!(
            prompt,
            "\nIMPORTANT: Think and respond as a {grade} student learning about {topic}. \
             Your language, reasoning depth, and mathematical sophistication should match \
             this grade level.\n",
            grade = ctx.grade_level,
            topic = ctx.topic,
        );
    }

    if !history.is_empty() {
        let lines = history
            .iter()
            .map(|msg| format!("{}: {}", msg.speaker, msg.message))
            .collect::<Vec<_>>()
            .join("\n");
        let _ = write!(prompt, "\nCONVERSATION HISTORY:\n{}\n", lines);
    }

    let _ = write!(
        prompt,
        "\nYour task is to respond to your teacher's question authentically based on your profile.\n\
         You must evaluate:\n\
         1. Would you raise your hand to answer this question?\n\
         2. How confident do you feel about your answer? (0-1 scale)\n\
         3. What is your thinking process?\n\
         4. What would you say if called on? ALWAYS provide a response - even if you would not \
         raise your hand, you still have thoughts you could share if called on. Keep it brief \
         and authentic to a {grade} student.\n\n\
         Respond in JSON with exactly these keys:\n\
         {{\n\
           \"would_participate\": true or false,\n\
           \"confidence\": 0.0-1.0,\n\
           \"thinking\": \"your internal reasoning\",\n\
           \"response\": \"what you would say if called on (never empty)\"\n\
         }}",
        grade = grade,
    );

    prompt
}

fn persona_approach_block(approach: &PersonaApproach) -> String {
    let mut block = format!("YOUR APPROACH TO THIS PROBLEM:\n{}\n", approach.approach);
    if !approach.strengths.is_empty() {
        let _ = write!(
            block,
            "\nWhere this approach serves you well:\n{}\n",
            bullet_list(&approach.strengths)
        );
    }
    if !approach.likely_misconceptions.is_empty() {
        let _ = write!(
            block,
            "\nMisconceptions you are prone to here:\n{}\n",
            bullet_list(&approach.likely_misconceptions)
        );
    }
    block
}

/// Renders every catalog persona as a profile block for the lesson
/// analyzer, so one call can derive a distinct approach per persona.
pub fn catalog_profiles_block(catalog: &PersonaCatalog) -> String {
    catalog
        .iter()
        .map(|persona| {
            format!(
                "STUDENT PROFILE: {name}\n\
                 - ID: {id}\n\
                 - Learning Style: {style}\n\
                 - Description: {description}\n\
                 - Thinking Approach: {thinking}\n\
                 - Strengths: {strengths}\n\
                 - Challenges: {challenges}",
                name = persona.name,
                id = persona.id,
                style = persona.learning_style,
                description = persona.description,
                thinking = persona.thinking_approach,
                strengths = persona.strengths.join(", "),
                challenges = persona.challenges.join(", "),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn lesson_context_block(ctx: &LessonContext) -> String {
    format!(
        "**LESSON CONTEXT:**\n\
         Grade Level: {}\n\
         Subject: {}\n\
         Topic: {}\n\n\
         **Learning Objectives:**\n{}\n\n\
         Context: {}\n",
        ctx.grade_level,
        ctx.subject,
        ctx.topic,
        bullet_list(&ctx.learning_objectives),
        ctx.context_summary,
    )
}

/// Renders the just-completed exchange for the coaching stream: teacher
/// prompt, every persona's reaction, and recent history for pattern
/// analysis.
pub fn interaction_block(
    prompt: &str,
    responses: &[PersonaResponse],
    context: Option<&LessonContext>,
    history: &[ConversationMessage],
) -> String {
    let mut block = String::new();

    if let Some(ctx) = context {
        let _ = write!(block, "{}\n---\n\n", lesson_context_block(ctx));
    }

    let _ = write!(
        block,
        "**Teacher Prompt:** {}\n\n**Student Responses:**\n",
        prompt
    );
    for response in responses {
        let hand = if response.would_participate {
            "raised hand"
        } else {
            "did not raise hand"
        };
        let _ = write!(
            block,
            "- **{}** ({})\n  Response: {}\n\n",
            response.persona_name, hand, response.response
        );
    }

    if !history.is_empty() {
        let _ = write!(block, "**Conversation History (for pattern analysis):**\n");
        // Last three exchanges are enough for pattern spotting.
        let start = history.len().saturating_sub(6);
        for msg in &history[start..] {
            let _ = writeln!(block, "{}: {}", msg.speaker, msg.message);
        }
    }

    block
}

/// Renders the lesson context plus the complete numbered transcript for
/// the end-of-session report.
pub fn transcript_block(ctx: &LessonContext, transcript: &[ConversationMessage]) -> String {
    let mut block = lesson_context_block(ctx);
    let _ = write!(
        block,
        "\n**Key Concepts:** {}\n\n---\n\n**COMPLETE LESSON TRANSCRIPT:**\n\n",
        ctx.key_concepts.join(", ")
    );
    for (i, msg) in transcript.iter().enumerate() {
        let _ = writeln!(block, "{}. **{}:** {}", i + 1, msg.speaker, msg.message);
    }
    let _ = write!(
        block,
        "\n---\n\nAnalyze this lesson and provide comprehensive feedback following the framework above."
    );
    block
}
