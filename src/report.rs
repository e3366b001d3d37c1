//! Markdown rendering of claim matches for human review.

use std::fmt::Write;

use crate::propositions::ClaimMatches;

pub fn render_claim_matches(title: &str, claims: &[ClaimMatches]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", title.trim());

    if claims.is_empty() {
        md.push_str("No supporting propositions were found.\n");
        return md;
    }

    for (idx, claim) in claims.iter().enumerate() {
        let _ = writeln!(md, "## Claim {}\n", idx + 1);
        for line in claim.claim.trim().lines() {
            let _ = writeln!(md, "> {line}");
        }
        md.push('\n');

        if claim.matches.is_empty() {
            md.push_str("_No matches._\n\n");
            continue;
        }

        for m in &claim.matches {
            let _ = write!(md, "- **{:.3}** `{}`", m.similarity, m.reference_id);
            if let Some(file_name) = &m.file_name {
                let _ = write!(md, " ({file_name})");
            }
            let _ = writeln!(md, ": {}", m.text.trim());
        }
        md.push('\n');
    }

    md
}
