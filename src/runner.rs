//! One-shot mode: no daemon, no persistent conversation. Read an input
//! file, make a single remote call, write the reply artifacts, report what
//! changed.

use std::path::Path;

use anyhow::Context;

use crate::codebase::{FileRecord, FoldFile};
use crate::config::ProfileConfig;
use crate::conversation::Message;
use crate::extract;
use crate::provider::LlmClient;
use crate::spinner::SpinnerGuard;
use crate::summary;

/// Companion record for one run, written next to the main artifact so runs
/// can be compared after the fact.
fn meta_file_name(profile_name: &str) -> String {
    format!("sew_{profile_name}_output.json")
}

pub fn run_once(
    dir: &Path,
    file: &Path,
    message: &str,
    profile_name: &str,
    profile: &ProfileConfig,
    client: &dyn LlmClient,
) -> anyhow::Result<()> {
    let input_text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read input file {}", file.display()))?;

    let prompt = format!("{}{}", profile.prompt_prepend(), message);

    // A parseable fold file seeds the conversation the structured way; any
    // other text rides along as a plain user message.
    let fold = FoldFile::parse(&input_text).ok();
    let mut messages = vec![Message::system(profile.role())];
    match &fold {
        Some(fold) => {
            messages.extend(fold.instruction_messages());
            let files_json = serde_json::to_string_pretty(&fold.files)?;
            messages.push(Message::user(format!(
                "Current codebase files:\n```json\n{files_json}\n```"
            )));
        }
        None => messages.push(Message::user(input_text)),
    }
    messages.push(Message::user(prompt.clone()));

    eprintln!("model: {}", profile.model());
    eprintln!("role: {}", profile.role());
    eprintln!("temperature: {}", profile.temperature());
    eprintln!("output: {}", profile.output());

    let started = std::time::Instant::now();
    let reply = {
        let _spinner = SpinnerGuard::new();
        client.complete(&messages, profile.model(), profile.temperature())?
    };
    eprintln!("response received in {:.1}s", started.elapsed().as_secs_f64());

    let output_path = dir.join(profile.output());
    let (payload, reply_message) = extract::extract(&reply);
    if payload.is_empty() {
        tracing::warn!("reply carried no edit payload, writing raw text");
        std::fs::write(&output_path, &reply)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
    } else {
        let value: serde_json::Value = serde_json::from_str(&payload)?;
        std::fs::write(&output_path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
    }
    if !reply_message.is_empty() {
        println!("{reply_message}");
    }

    let meta = serde_json::json!({
        "input": file.display().to_string(),
        "prompt": prompt,
        "response": reply,
        "used_role": profile.role(),
        "used_model": profile.model(),
        "used_profile": profile_name,
        "temperature": profile.temperature(),
    });
    let meta_path = dir.join(meta_file_name(profile_name));
    std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("failed to write {}", meta_path.display()))?;

    if let (Some(fold), false) = (&fold, payload.is_empty()) {
        let parsed: serde_json::Value = serde_json::from_str(&payload)?;
        if let Ok(edits) = serde_json::from_value::<Vec<FileRecord>>(parsed["files"].clone()) {
            summary::print_change_analysis(&fold.files, &edits);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedClient {
        reply: String,
    }

    impl LlmClient for CannedClient {
        fn complete(&self, _: &[Message], _: &str, _: f64) -> anyhow::Result<String> {
            Ok(self.reply.clone())
        }
    }

    fn profile_for(dir_output: &str) -> ProfileConfig {
        ProfileConfig {
            output: Some(dir_output.to_string()),
            ..ProfileConfig::default()
        }
    }

    #[test]
    fn test_run_once_fold_input_writes_pretty_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        std::fs::write(&input, r#"{"files": [{"path": "a.txt", "content": "old"}]}"#).unwrap();
        let client = CannedClient {
            reply: r#"{"files": [{"path": "a.txt", "content": "new"}]}"#.into(),
        };
        run_once(
            dir.path(),
            &input,
            "update",
            "default",
            &profile_for("out.json"),
            &client,
        )
        .unwrap();

        let artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap())
                .unwrap();
        assert_eq!(artifact["files"][0]["content"], "new");

        let meta: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("sew_default_output.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["used_profile"], "default");
        assert_eq!(meta["prompt"], "update");
        assert!(meta["response"].as_str().unwrap().contains("new"));
    }

    #[test]
    fn test_run_once_plain_text_input_and_reply() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "free-form notes").unwrap();
        let client = CannedClient {
            reply: "Just advice, no JSON".into(),
        };
        run_once(
            dir.path(),
            &input,
            "advise me",
            "default",
            &profile_for("out.txt"),
            &client,
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "Just advice, no JSON"
        );
    }

    #[test]
    fn test_run_once_prompt_prepend() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        std::fs::write(&input, r#"{"files": []}"#).unwrap();
        let profile = ProfileConfig {
            prompt_prepend: Some("Always respond in JSON. ".into()),
            output: Some("o.json".into()),
            ..ProfileConfig::default()
        };
        let client = CannedClient {
            reply: r#"{"files": []}"#.into(),
        };
        run_once(dir.path(), &input, "do it", "p1", &profile, &client).unwrap();
        let meta: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("sew_p1_output.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["prompt"], "Always respond in JSON. do it");
    }

    #[test]
    fn test_run_once_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = CannedClient { reply: "".into() };
        let err = run_once(
            dir.path(),
            &dir.path().join("absent.json"),
            "m",
            "default",
            &ProfileConfig::default(),
            &client,
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to read input file"));
    }

    #[test]
    fn test_meta_file_name_embeds_profile() {
        assert_eq!(meta_file_name("rust"), "sew_rust_output.json");
    }
}
