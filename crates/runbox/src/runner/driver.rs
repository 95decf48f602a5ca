//! Driver programs for function-call mode
//!
//! The driver is the submitted code followed by a short trailer that reads a
//! JSON value from the file named by [`ARGS_FILE_ENV`], calls the entry point
//! with it (spreading a list into positional arguments) and prints the return
//! value. Stdin still carries the raw input, so submitted code that reads it
//! at import time cannot swallow the arguments. One driver serves every test
//! case of a job.

use crate::config::Language;

/// Environment variable holding the path of the test's argument file
pub const ARGS_FILE_ENV: &str = "RUNBOX_ARGS_FILE";

/// Name of the argument file inside a test's workspace
pub const ARGS_FILE_NAME: &str = "args.json";

/// Build the driver source, or `None` if the language has no function-call mode
///
/// `entry_point` must already be a valid identifier for `language`.
pub fn synthesize(language: Language, code: &str, entry_point: &str) -> Option<String> {
    let trailer = match language {
        Language::Python => python_trailer(entry_point),
        Language::JavaScript => javascript_trailer(entry_point),
        Language::Cpp => return None,
    };

    let mut source = String::with_capacity(code.len() + trailer.len() + 1);
    source.push_str(code);
    if !code.ends_with('\n') {
        source.push('\n');
    }
    source.push_str(&trailer);
    Some(source)
}

fn python_trailer(entry_point: &str) -> String {
    format!(
        r#"

import json as __runbox_json, os as __runbox_os
with open(__runbox_os.environ["{ARGS_FILE_ENV}"], encoding="utf-8") as __runbox_file:
    __runbox_args = __runbox_json.load(__runbox_file)
if isinstance(__runbox_args, list):
    __runbox_result = {entry_point}(*__runbox_args)
else:
    __runbox_result = {entry_point}(__runbox_args)
print(__runbox_result)
"#
    )
}

fn javascript_trailer(entry_point: &str) -> String {
    format!(
        r#"

{{
  const __runboxArgs = JSON.parse(
    require('fs').readFileSync(process.env.{ARGS_FILE_ENV}, 'utf8'),
  );
  const __runboxResult = Array.isArray(__runboxArgs)
    ? {entry_point}(...__runboxArgs)
    : {entry_point}(__runboxArgs);
  console.log(typeof __runboxResult === 'object' ? JSON.stringify(__runboxResult) : __runboxResult);
}}
"#
    )
}
