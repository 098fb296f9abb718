//! Challenge page rendering.
//!
//! The page states the puzzle, carries the fingerprint and difficulty, posts
//! the answer back in the `powgate` form field and tries to solve the puzzle
//! itself with SubtleCrypto. Its nonce layout (8-byte little-endian counter)
//! and bit convention match [`crate::solver`] and [`crate::bits`].

use crate::session::COOKIE_NAME;
use std::fmt::Write;

/// Everything a renderer may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeView<'a> {
    pub fingerprint_b64: &'a str,
    pub difficulty: u32,
    pub message: Option<&'a str>,
}

pub trait ChallengeRenderer: Send + Sync {
    fn render(&self, view: &ChallengeView<'_>) -> String;
}

/// Built-in HTML page.
#[derive(Debug, Clone, Default)]
pub struct HtmlChallengePage {
    pub source_url: Option<String>,
}

impl HtmlChallengePage {
    pub fn new(source_url: Option<String>) -> Self {
        Self { source_url }
    }
}

impl ChallengeRenderer for HtmlChallengePage {
    fn render(&self, view: &ChallengeView<'_>) -> String {
        let fingerprint = escape_html(view.fingerprint_b64);
        let bits = view.difficulty;
        let mut page = String::with_capacity(4096);

        page.push_str(HEAD);
        let _ = write!(
            page,
            "<p>This site is protected by powgate {}.</p>\n\
             <p>You must complete this proof of work challenge before you can access this site.</p>\n",
            env!("CARGO_PKG_VERSION")
        );
        if let Some(message) = view.message.filter(|m| !m.is_empty()) {
            let _ = writeln!(page, "<p><strong>{}</strong></p>", escape_html(message));
        }
        let _ = write!(
            page,
            "<p>Select a nonce of at most 32 bytes such that, when it is appended to the \
             decoded form of the following base64 string and the whole is hashed with SHA-256, \
             the first {bits} bits of the hash are zero. Within one octet, higher bits come \
             before lower bits.</p>\n\
             <p><code id=\"fingerprint\">{fingerprint}</code></p>\n\
             <form method=\"POST\">\n\
             <p>Encode your nonce in base64 and submit it below. A successful submission sets a \
             cookie that lets you through for the rest of the week.</p>\n\
             <input name=\"{COOKIE_NAME}\" type=\"text\" autocomplete=\"off\" />\n\
             <input type=\"submit\" value=\"Submit\" />\n\
             </form>\n\
             <p id=\"solver_status\"></p>\n\
             <details>\n<summary>Offline solver</summary>\n\
             <pre>powgate solve {fingerprint} {bits}</pre>\n\
             </details>\n"
        );
        if let Some(url) = &self.source_url {
            let url = escape_html(url);
            let _ = writeln!(page, "<p>Source code: <a href=\"{url}\">{url}</a></p>");
        }
        let _ = write!(
            page,
            "</body>\n<script>\nconst CHALLENGE = \"{fingerprint}\";\nconst DIFFICULTY = {bits};\n{SOLVER_JS}</script>\n</html>\n"
        );
        page
    }
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const HEAD: &str = "<!DOCTYPE html>
<html>
<head>
<meta charset=\"utf-8\" />
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />
<title>Proof of Work Challenge</title>
</head>
<body>
<header>
<h1>Proof of Work Challenge</h1>
</header>
";

const SOLVER_JS: &str = r#"document.addEventListener("DOMContentLoaded", function () {
	const form = document.querySelector("form");
	const field = form.querySelector("input[type='text']");
	const status = document.getElementById("solver_status");

	if (!window.crypto || !window.crypto.subtle) {
		status.textContent = "SubtleCrypto is not available. Solve the challenge with the offline solver.";
		return;
	}

	let active = true;
	form.addEventListener("submit", function () { active = false; });

	function zeroPrefix(digest, bits) {
		const full = bits >>> 3;
		for (let i = 0; i < full; i++) {
			if (digest[i] !== 0) return false;
		}
		const rem = bits & 7;
		if (rem !== 0 && (digest[full] & (0xFF << (8 - rem)) & 0xFF) !== 0) return false;
		return true;
	}

	async function solve() {
		const prefix = Uint8Array.from(atob(CHALLENGE), (c) => c.charCodeAt(0));
		const candidate = new Uint8Array(prefix.length + 8);
		candidate.set(prefix, 0);
		const view = new DataView(candidate.buffer, prefix.length, 8);
		let counter = 0n;
		status.textContent = "Solving in the browser...";
		while (active) {
			view.setBigUint64(0, counter, true);
			const digest = new Uint8Array(await crypto.subtle.digest("SHA-256", candidate));
			if (zeroPrefix(digest, DIFFICULTY)) {
				field.value = btoa(String.fromCharCode(...candidate.subarray(prefix.length)));
				status.textContent = "Solution found, submitting.";
				form.submit();
				return;
			}
			counter++;
			if ((counter & 0x3FFn) === 0n) {
				status.textContent = "Solving in the browser... " + counter + " candidates tried.";
				await new Promise((r) => setTimeout(r, 0));
			}
		}
	}

	solve();
});
"#;
