//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Best-effort scan for the first brace-delimited, brace-free substring.
/// Model replies are untrusted text; this pairs the leftmost `}` with the
/// closest `{` before it, so `x {a} b {c}` yields `{a}` and
/// `{oops {"k": 1}` yields `{"k": 1}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let mut open: Option<usize> = None;
  for (i, ch) in text.char_indices() {
    match ch {
      '{' => open = Some(i),
      '}' => {
        if let Some(start) = open {
          return Some(&text[start..=i]);
        }
      }
      _ => {}
    }
  }
  None
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let cut = s
    .char_indices()
    .map(|(i, _)| i)
    .take_while(|i| *i <= max)
    .last()
    .unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
