use action_primitives::RaceWinner;
use tracing::{error, info, instrument, warn};

use super::{TrService, OUTCOME_TIMEOUT};
use crate::errors::TraResult;
use crate::models::{SessionState, UserInfo};
use crate::site::{self, css, login};

impl TrService {
    /// Log in to the member area.
    ///
    /// Returns `false` for rejected credentials, timeouts and automation
    /// failures alike; the session only changes on success.
    #[instrument(name = "tr.login", parent = &self.span, skip_all, fields(username = %username))]
    pub async fn login(&mut self, username: &str, password: &str) -> bool {
        info!("attempting login");
        match self.submit_login(username, password).await {
            Ok(true) => {
                self.session = SessionState {
                    is_logged_in: true,
                    user_info: Some(UserInfo {
                        username: username.to_string(),
                    }),
                };
                info!("login successful");
                true
            }
            Ok(false) => false,
            Err(err) if err.is_timeout() => {
                error!(%err, "login timeout");
                false
            }
            Err(err) => {
                error!(%err, "error during login");
                false
            }
        }
    }

    async fn submit_login(&self, username: &str, password: &str) -> TraResult<bool> {
        let nav = self.navigator();

        nav.go_to(site::LOGIN_URL).await?;
        info!("login page loaded");
        self.wait_overlay_gone().await?;

        nav.wait_clickable(&css(login::USERNAME), None).await?;
        nav.fill(&css(login::USERNAME), username, None).await?;
        nav.wait_clickable(&css(login::PASSWORD), None).await?;
        nav.fill(&css(login::PASSWORD), password, None).await?;
        nav.random_pause().await;

        info!("submitting login form");
        nav.click(&css(login::SUBMIT), None).await?;

        let winner = nav
            .wait_for_url_or_element(
                site::PROFILE_URL,
                &css(login::ERROR_PANEL),
                Some(OUTCOME_TIMEOUT),
            )
            .await?;
        match winner {
            RaceWinner::First => Ok(true),
            RaceWinner::Second => {
                let message = self.message_or_unknown(login::ERROR_MESSAGE).await?;
                warn!(%message, "login rejected");
                Ok(false)
            }
        }
    }
}
