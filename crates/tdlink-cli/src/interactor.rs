//! Console prompts for the interactive and QR logins.

use anyhow::{anyhow, Context, Result};
use tdlink_core::auth::AuthorizerInputs;
use tdlink_core::AuthorizationState;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{mpsc, watch};

type Input = Lines<BufReader<tokio::io::Stdin>>;

fn stdin_lines() -> Input {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn prompt<R>(lines: &mut Lines<R>, label: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut stderr = tokio::io::stderr();
    stderr.write_all(format!("{}: ", label).as_bytes()).await?;
    stderr.flush().await?;

    let line = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
        .ok_or_else(|| anyhow!("stdin closed while waiting for {}", label))?;
    Ok(line.trim().to_string())
}

/// Answer the interactive authorizer's prompts until its state feed closes.
pub async fn drive(inputs: AuthorizerInputs) -> Result<()> {
    drive_with(inputs, &mut stdin_lines()).await
}

async fn drive_with<R>(mut inputs: AuthorizerInputs, lines: &mut Lines<R>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(state) = inputs.states.recv().await {
        let (label, target) = match state {
            AuthorizationState::WaitPhoneNumber => ("Phone number", &inputs.phone_number),
            AuthorizationState::WaitCode => ("Code", &inputs.code),
            AuthorizationState::WaitPassword => ("Password", &inputs.password),
            _ => continue,
        };
        let answer = prompt(lines, label).await?;
        target
            .send(answer)
            .await
            .map_err(|_| anyhow!("Authorizer stopped before {} was delivered", label))?;
    }
    Ok(())
}

/// Prompt for the two-step password whenever the engine asks for it.
pub async fn drive_password(
    mut updates: watch::Receiver<Option<AuthorizationState>>,
    password: mpsc::Sender<String>,
) -> Result<()> {
    let mut lines = stdin_lines();
    while updates.changed().await.is_ok() {
        let waiting = matches!(*updates.borrow_and_update(), Some(AuthorizationState::WaitPassword));
        if waiting {
            let answer = prompt(&mut lines, "Password").await?;
            if password.send(answer).await.is_err() {
                break;
            }
        }
    }
    Ok(())
}

/// Render a login link for scanning on the other device.
pub fn show_link(link: &str) -> tdlink_core::Result<()> {
    eprintln!("Confirm this login on another device:");
    println!("{}", link);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answers_follow_states() {
        let (phone_tx, mut phone_rx) = mpsc::channel(4);
        let (code_tx, mut code_rx) = mpsc::channel(4);
        let (password_tx, _password_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = mpsc::channel(4);
        let inputs = AuthorizerInputs {
            phone_number: phone_tx,
            code: code_tx,
            password: password_tx,
            states: state_rx,
        };

        state_tx.send(AuthorizationState::WaitParameters).await.unwrap();
        state_tx.send(AuthorizationState::WaitPhoneNumber).await.unwrap();
        state_tx.send(AuthorizationState::WaitCode).await.unwrap();
        state_tx.send(AuthorizationState::Ready).await.unwrap();
        drop(state_tx);

        let mut lines = BufReader::new(&b"+15550100\n 12345\n"[..]).lines();
        drive_with(inputs, &mut lines).await.unwrap();

        assert_eq!(phone_rx.recv().await.unwrap(), "+15550100");
        assert_eq!(code_rx.recv().await.unwrap(), "12345");
    }

    #[tokio::test]
    async fn test_prompt_trims_input() {
        let mut lines = BufReader::new(&b"  +15550100 \n"[..]).lines();
        assert_eq!(prompt(&mut lines, "Phone number").await.unwrap(), "+15550100");
    }

    #[tokio::test]
    async fn test_prompt_fails_on_eof() {
        let mut lines = BufReader::new(&b""[..]).lines();
        let err = prompt(&mut lines, "Code").await.unwrap_err();
        assert!(err.to_string().contains("Code"));
    }
}
