//! Inline notice shown when a page is served untranslated.

use crate::translation::TranslationError;

const NOTICE_ID: &str = "translation-notice";

fn message(err: &TranslationError) -> &'static str {
    match err {
        TranslationError::TooLargePage { .. } => {
            "This page is too large to be translated automatically. It is shown in its original language."
        }
        TranslationError::Failed(_) | TranslationError::Document(_) => {
            "This page could not be translated right now. It is shown in its original language."
        }
    }
}

/// Script block that renders the notice as a banner at the top of the page.
pub fn notice_script(err: &TranslationError) -> String {
    format!(
        "<script id=\"{id}\">(function(){{var n=document.createElement('div');\
n.setAttribute('role','alert');\
n.style.cssText='position:fixed;top:0;left:0;right:0;z-index:2147483647;padding:8px;background:#fff3cd;color:#664d03;font:14px sans-serif;text-align:center';\
n.textContent={msg};\
document.body.insertBefore(n,document.body.firstChild);}})();</script>",
        id = NOTICE_ID,
        msg = serde_json::Value::from(message(err)),
    )
}

/// Insert the notice before the last `</body>`, or append it.
pub fn inject_notice(html: &str, err: &TranslationError) -> String {
    let script = notice_script(err);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(&script);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, script),
    }
}
