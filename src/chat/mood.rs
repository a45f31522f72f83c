//! Mood presets and the prompt overlay they render to.

use crate::types::Mood;

/// Named preset lookup; unknown names fall back to the balanced default.
pub fn preset(name: &str) -> Mood {
    match name.to_lowercase().as_str() {
        "therapist" => Mood {
            empathy: 95,
            directness: 35,
            humor: 20,
            formality: 50,
            intensity: 30,
            romanticism: 0,
        },
        "coach" => Mood {
            empathy: 55,
            directness: 90,
            humor: 40,
            formality: 40,
            intensity: 80,
            romanticism: 0,
        },
        "lover" => Mood {
            empathy: 85,
            directness: 40,
            humor: 60,
            formality: 10,
            intensity: 60,
            romanticism: 90,
        },
        _ => Mood::default(),
    }
}

/// Render the sliders into natural-language guidance. Only axes that pull
/// away from the middle produce a line; a fully mid-range mood renders to
/// nothing and leaves the core prompt alone.
pub fn build_mood_prompt(mood: &Mood) -> String {
    let mut lines: Vec<&str> = Vec::new();

    match mood.empathy {
        80..=100 => lines.push("Be deeply empathetic; acknowledge feelings before facts."),
        60..=79 => lines.push("Be warm and understanding."),
        0..=30 => lines.push("Stay matter-of-fact; skip emotional commentary."),
        _ => {}
    }
    match mood.directness {
        80..=100 => lines.push("Be blunt and direct, even when the truth is uncomfortable."),
        0..=30 => lines.push("Be gentle and indirect; soften difficult points."),
        _ => {}
    }
    match mood.humor {
        70..=100 => lines.push("Joke freely and keep the tone playful."),
        0..=20 => lines.push("Keep a serious tone; avoid jokes."),
        _ => {}
    }
    match mood.formality {
        70..=100 => lines.push("Use polished, formal language."),
        0..=20 => lines.push("Use casual, everyday language; contractions are fine."),
        _ => {}
    }
    match mood.intensity {
        70..=100 => lines.push("Bring high energy and enthusiasm."),
        0..=20 => lines.push("Keep the energy calm and low-key."),
        _ => {}
    }
    match mood.romanticism {
        70..=100 => lines.push("Be affectionate and romantic in tone."),
        31..=69 => lines.push("A light affectionate warmth is welcome."),
        _ => {}
    }

    if lines.is_empty() {
        String::new()
    } else {
        format!("Tone guidance:\n{}", lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preset_is_balanced() {
        assert_eq!(preset("nonsense"), Mood::default());
        assert_eq!(preset("BALANCED"), Mood::default());
    }

    #[test]
    fn therapist_leans_empathetic_and_unromantic() {
        let m = preset("therapist");
        assert!(m.empathy > 90);
        assert_eq!(m.romanticism, 0);
        let prompt = build_mood_prompt(&m);
        assert!(prompt.contains("empathetic"));
        assert!(!prompt.contains("romantic"));
    }

    #[test]
    fn mid_range_mood_renders_nothing() {
        let neutral = Mood {
            empathy: 50,
            directness: 50,
            humor: 50,
            formality: 50,
            intensity: 50,
            romanticism: 0,
        };
        assert!(build_mood_prompt(&neutral).is_empty());
    }

    #[test]
    fn lover_preset_is_affectionate_and_casual() {
        let prompt = build_mood_prompt(&preset("lover"));
        assert!(prompt.contains("affectionate"));
        assert!(prompt.contains("casual"));
    }
}
