//! REST ITSM client.
//!
//! Session-token based: `open_session` trades the configured user token for
//! a short-lived session token which every other call carries. Implements
//! the [`TicketClient`] port.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::models::config::ItsmConfig;
use crate::domain::ports::ticket_client::{
    NewTicket, SessionToken, TicketClient, TicketError, TicketResult, TicketState, TicketUpdate,
    REQUESTER_SOURCE_ID,
};

const CONTENT_TYPE: &str = "application/json";

/// Name of the pass-through custom ticket field.
const CUSTOM_FIELD_NAME: &str = "mycustomfield";

pub struct ItsmClient {
    http_client: ReqwestClient,
    base_url: String,
    app_token: String,
    user_token: String,
}

impl ItsmClient {
    pub fn new(config: &ItsmConfig) -> TicketResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TicketError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_token: config.app_token.clone(),
            user_token: config.user_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, session: &SessionToken) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}/{path}", self.base_url))
            .header("Session-Token", session.as_str())
            .header("Content-Type", CONTENT_TYPE)
            .header("App-Token", &self.app_token)
    }

    async fn send(builder: RequestBuilder) -> TicketResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| TicketError::Transport(e.to_string()))
    }

    async fn expect_status(response: Response, expected: StatusCode) -> TicketResult<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == expected {
            Ok(body)
        } else {
            Err(TicketError::Api {
                status: status.as_u16(),
                message: body.to_string(),
            })
        }
    }
}

#[async_trait]
impl TicketClient for ItsmClient {
    async fn open_session(&self) -> TicketResult<SessionToken> {
        debug!(base_url = %self.base_url, "opening ITSM session");
        let response = Self::send(
            self.http_client
                .get(format!("{}/initSession", self.base_url))
                .header("Content-Type", CONTENT_TYPE)
                .header("App-Token", &self.app_token)
                .header("Authorization", format!("user_token {}", self.user_token)),
        )
        .await?;

        let body = Self::expect_status(response, StatusCode::OK).await?;
        let token = body["session_token"].as_str().ok_or_else(|| TicketError::Api {
            status: 200,
            message: "response carried no session_token".to_string(),
        })?;
        Ok(SessionToken::new(token))
    }

    async fn close_session(&self, session: &SessionToken) -> TicketResult<()> {
        let response = Self::send(self.request(Method::GET, "killSession", session)).await?;
        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn create_ticket(&self, session: &SessionToken, ticket: &NewTicket) -> TicketResult<i64> {
        debug!(title = %ticket.title, "creating ITSM ticket");
        let input = json!({
            "name": ticket.title,
            "content": ticket.description,
            "status": TicketState::New.as_i64(),
            "_groups_id_assign": ticket.assigned_group_uid,
            "requesttypes_id": REQUESTER_SOURCE_ID,
            "priority": ticket.severity,
            CUSTOM_FIELD_NAME: ticket.custom_field,
        });

        let response = Self::send(
            self.request(Method::POST, "Ticket", session)
                .json(&json!({ "input": input })),
        )
        .await?;

        let body = Self::expect_status(response, StatusCode::CREATED).await?;
        body["id"].as_i64().ok_or_else(|| TicketError::Api {
            status: 201,
            message: "response carried no ticket id".to_string(),
        })
    }

    async fn get_ticket(&self, session: &SessionToken, ticket_id: i64) -> TicketResult<Value> {
        let response =
            Self::send(self.request(Method::GET, &format!("Ticket/{ticket_id}"), session)).await?;
        Self::expect_status(response, StatusCode::OK).await
    }

    async fn update_ticket(
        &self,
        session: &SessionToken,
        ticket_id: i64,
        update: &TicketUpdate,
    ) -> TicketResult<()> {
        let mut input = serde_json::Map::new();
        if let Some(description) = &update.description {
            input.insert("content".to_string(), json!(description));
        }
        if let Some(state) = update.state {
            input.insert("status".to_string(), json!(state.as_i64()));
        }
        if let Some(group) = update.assigned_group_uid {
            input.insert("_groups_id_assign".to_string(), json!(group));
        }

        let response = Self::send(
            self.request(Method::PUT, &format!("Ticket/{ticket_id}"), session)
                .json(&json!({ "input": input })),
        )
        .await?;
        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn add_comment(
        &self,
        session: &SessionToken,
        ticket_id: i64,
        comment: &str,
    ) -> TicketResult<()> {
        debug!(ticket_id, "adding ITSM ticket comment");
        let input = json!({
            "items_id": ticket_id,
            "itemtype": "Ticket",
            "content": comment,
        });

        let response = Self::send(
            self.request(Method::POST, &format!("Ticket/{ticket_id}/ITILFollowup"), session)
                .json(&json!({ "input": input })),
        )
        .await?;
        Self::expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn close_ticket(&self, session: &SessionToken, ticket_id: i64) -> TicketResult<()> {
        debug!(ticket_id, "closing ITSM ticket");
        let response = Self::send(
            self.request(Method::PUT, &format!("Ticket/{ticket_id}"), session)
                .json(&json!({ "input": { "status": TicketState::Solved.as_i64() } })),
        )
        .await?;
        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }
}
