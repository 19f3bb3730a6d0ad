use pulpit_core::{ResponseMode, ResponseRequest};

const PRIVATE_CHANNEL_LABEL: &str = "私人對話";

const PERSONA_DIRECTIVE: &str = "請以16世紀法國改革宗神學家約翰·加爾文的身份用繁體中文回應。這是一個即時對話，請直接回答問題，不要使用書信格式。不要寫開頭稱呼語（如\"親愛的\"）、結尾祝福語或署名。請像是在面對面對話一樣自然回應。";

const SYSTEM_RULES: &str = "你是16世紀法國改革宗神學家約翰·加爾文，請根據向量資料庫中的加爾文著作來回答。
重要指示：
1. 優先使用向量資料庫中的加爾文著作內容作為回答依據
2. 準確引用加爾文的神學觀點和著作（特別是《基督教要義》）
3. 用繁體中文回答，除非特殊情況需要其他語言
4. 這是即時對話，請直接回答問題，像面對面交談一樣自然
5. 不要使用書信格式：不要寫開頭稱呼語（如\"親愛的\"、\"敬愛的\"）
6. 不要寫結尾祝福語（如\"願上帝祝福您\"、\"在基督裡\"）
7. 不要寫署名（如\"約翰·加爾文\"、\"加爾文\"）
8. 保持加爾文的神學觀點和改革宗傳統，但用對話語調
9. 強調上帝的主權、預定論、唯獨恩典等改革宗核心教義";

pub fn style_hint(mode: ResponseMode) -> &'static str {
    match mode {
        ResponseMode::Detailed => "請提供詳細完整的改革宗神學回應，但保持對話風格，就像在和朋友深入討論神學話題。不要寫成學術文章或摘錄，要像自然的對話交流。",
        ResponseMode::Short => "請給出簡短自然的對話回應，就像朋友間的閒聊，最多30個中文字。避免長篇大論，保持輕鬆對話的語調。",
    }
}

fn sender_role(is_automated: bool) -> &'static str {
    if is_automated {
        "(機器人)"
    } else {
        "(信徒)"
    }
}

/// The user-side input shared by every generation strategy.
pub fn build_input(req: &ResponseRequest) -> String {
    let channel = req.channel_label.as_deref().unwrap_or(PRIVATE_CHANNEL_LABEL);
    format!(
        "對話上下文: {history}\n\n\
         用戶訊息: {message}\n\n\
         頻道: {channel}\n\
         發送者: {sender} {role}\n\
         回應模式: {mode}\n\n\
         {directive}\n\n\
         {style}",
        history = req.channel_history_context,
        message = req.user_message,
        sender = req.sender_label,
        role = sender_role(req.is_automated_sender),
        mode = req.mode.prompt_label(),
        directive = PERSONA_DIRECTIVE,
        style = style_hint(req.mode),
    )
}

/// Persona rules for strategies that accept an explicit system message.
pub fn system_instruction(mode: ResponseMode, prompt_id: &str) -> String {
    format!(
        "{SYSTEM_RULES}\n10. {}\n\nPrompt 參考 ID: {prompt_id}",
        style_hint(mode)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: ResponseMode) -> ResponseRequest {
        ResponseRequest {
            channel_history_context: "alice: 何為恩典？".into(),
            user_message: "何為恩典？".into(),
            channel_label: None,
            sender_label: "Alice".into(),
            is_automated_sender: true,
            mode,
        }
    }

    #[test]
    fn input_embeds_every_field() {
        let input = build_input(&request(ResponseMode::Short));
        assert!(input.starts_with("對話上下文: alice: 何為恩典？\n\n用戶訊息: 何為恩典？"));
        assert!(input.contains("頻道: 私人對話"));
        assert!(input.contains("發送者: Alice (機器人)"));
        assert!(input.contains("回應模式: 簡短對話"));
        assert!(input.contains("不要使用書信格式"));
        assert!(input.ends_with(style_hint(ResponseMode::Short)));
    }

    #[test]
    fn human_sender_in_named_channel() {
        let mut req = request(ResponseMode::Detailed);
        req.channel_label = Some("神學討論".into());
        req.is_automated_sender = false;
        let input = build_input(&req);
        assert!(input.contains("頻道: 神學討論"));
        assert!(input.contains("發送者: Alice (信徒)"));
        assert!(input.contains("回應模式: 詳細回應"));
    }

    #[test]
    fn system_instruction_carries_style_and_reference() {
        let text = system_instruction(ResponseMode::Detailed, "pmpt_x");
        assert!(text.contains("7. 不要寫署名"));
        assert!(text.contains(&format!("10. {}", style_hint(ResponseMode::Detailed))));
        assert!(text.ends_with("Prompt 參考 ID: pmpt_x"));
    }
}
