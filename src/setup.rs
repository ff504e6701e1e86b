//! First-run setup and credential commands.
//!
//! `bytebrief setup` walks through the same checks a user needs before the
//! first archive: client secret present and parseable, consent completed,
//! archive document reachable. `bytebrief auth` only obtains the credential.

use anyhow::Result;

use crate::archive::{build_archiver, build_credential_store};
use crate::config::{Config, DOC_ID_ENV};
use crate::credential::ClientSecret;

const TEST_ENTRY: &str = "🧪 TEST TWEET: This is a test message from ByteBrief setup!";

/// Instructions shown when the client secret file is missing or invalid.
pub fn setup_instructions(config: &Config) -> String {
    format!(
        r#"Google Docs setup:

1. Go to Google Cloud Console (https://console.cloud.google.com/)
2. Create a new project or select an existing one
3. Enable the Google Docs API and the Google Drive API
4. Create OAuth 2.0 credentials of type "Desktop application"
5. Download the client secret JSON and save it as:
       {}
6. Run `bytebrief setup` again; a browser consent page completes the setup

Optional: archive into a specific document
- Create a Google Doc manually
- Copy the document ID from its URL (between /d/ and /edit)
- Set {} or `archive.document_id` in the config file
"#,
        config.auth.client_secret_path.display(),
        DOC_ID_ENV
    )
}

/// `bytebrief setup`.
pub async fn run_setup(config: &Config, test_entry: bool) -> Result<()> {
    println!("ByteBrief Google Docs setup");
    println!("{}", "=".repeat(40));

    if let Err(e) = ClientSecret::load(&config.auth.client_secret_path) {
        println!("{}", setup_instructions(config));
        return Err(e.into());
    }
    println!(
        "✅ Client secret found: {}",
        config.auth.client_secret_path.display()
    );

    let archiver = build_archiver(config)?;
    let id = archiver.resolve().await?;
    println!("✅ Authentication successful");
    println!("✅ Document ready: {}", archiver.document_url(&id));

    if test_entry {
        let confirmation = archiver.archive(TEST_ENTRY).await?;
        println!("{}", confirmation);
    }

    println!();
    println!("ByteBrief is ready. Archive a thread with: bytebrief archive --file thread.txt");
    Ok(())
}

/// `bytebrief auth`.
pub async fn run_auth(config: &Config) -> Result<()> {
    let credentials = build_credential_store(config)?;
    let credential = credentials.obtain().await?;
    match credential.expiry {
        Some(expiry) => println!("Credential valid until {}", expiry.to_rfc3339()),
        None => println!("Credential has no expiry"),
    }
    println!("Stored at {}", credentials.token_path().display());
    Ok(())
}
