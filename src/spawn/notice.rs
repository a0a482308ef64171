// 刷新公告与错过提示的文字

use std::time::Duration;

use crate::model::Character;

/// 刷新公告，不透露角色名
pub fn spawn_caption(claim_window: Duration) -> String {
    format!(
        "✨ A character has appeared! ✨\nType /grab <name> to claim it.\n\n⏳ Time limit: {}",
        describe_window(claim_window)
    )
}

pub fn missed_caption(character: &Character) -> String {
    format!(
        "⏰ Time's up! Everyone missed this one.\n\n{} Name: {}\n⚡ Anime: {}\n🎯 Rarity: {}\n\n💔 Better luck next time!",
        character.rarity_tag(),
        character.name,
        character.anime,
        character.rarity_label
    )
}

fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    match (secs / 60, secs % 60) {
        (0, s) => format!("{} seconds", s),
        (1, 0) => "1 minute".to_string(),
        (m, 0) => format!("{} minutes", m),
        (m, s) => format!("{}m {}s", m, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_caption_hides_name() {
        let caption = spawn_caption(Duration::from_secs(180));
        assert!(caption.contains("3 minutes"));
        assert!(caption.contains("/grab"));
    }

    #[test]
    fn test_window_descriptions() {
        assert_eq!(describe_window(Duration::from_secs(45)), "45 seconds");
        assert_eq!(describe_window(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_window(Duration::from_secs(90)), "1m 30s");
    }

    #[test]
    fn test_missed_caption_names_character() {
        let character = Character::new("1", "Rem", "Re:Zero", "💮 Exclusive");
        let caption = missed_caption(&character);
        assert!(caption.contains("Rem"));
        assert!(caption.contains("Re:Zero"));
        assert!(caption.contains("💮 Exclusive"));
    }
}
