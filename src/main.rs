use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

mod conversation;
mod dataset;
mod fallback;
mod farewell;
mod matcher;
mod mood;
mod settings;
mod text;

use conversation::{ConversationError, ConversationManager, TurnReply, INITIAL_QUESTIONS};
use dataset::Dataset;
use fallback::{FallbackResponder, OllamaCli};
use matcher::IntentMatcher;
use settings::Settings;

struct AppState {
    conversations: ConversationManager,
    matcher: IntentMatcher,
}

#[derive(Serialize)]
struct SessionStarted {
    session_id: Uuid,
    first_question: &'static str,
    initial_questions: [&'static str; 5],
}

#[derive(Deserialize)]
struct StartRequest {
    /// Session the client is leaving, if any.
    session_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct MessageRequest {
    session_id: Uuid,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct MessageResponse {
    response: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    assessment_complete: bool,
}

impl From<TurnReply> for MessageResponse {
    fn from(turn: TurnReply) -> Self {
        Self {
            response: turn.response,
            assessment_complete: turn.assessment_complete,
        }
    }
}

#[derive(Serialize)]
struct QuestionsResponse {
    questions: [&'static str; 5],
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("index.html"))
}

/// Starts a new chat session with a neutral mood and a fresh assessment.
/// A body of `{"session_id": ...}` closes the client's previous session.
#[post("/chat")]
async fn chat(req: Option<web::Json<StartRequest>>, data: web::Data<AppState>) -> impl Responder {
    let previous = req.and_then(|r| r.into_inner().session_id);
    let session_id = data.conversations.start(previous);
    HttpResponse::Ok().json(SessionStarted {
        session_id,
        first_question: INITIAL_QUESTIONS[0],
        initial_questions: INITIAL_QUESTIONS,
    })
}

#[post("/get_response")]
async fn get_response(
    req: web::Json<MessageRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let MessageRequest {
        session_id,
        message,
    } = req.into_inner();
    log::info!("Processing new message for session {}", session_id);

    match data
        .conversations
        .handle(session_id, &message, &data.matcher)
        .await
    {
        Ok(turn) => HttpResponse::Ok().json(MessageResponse::from(turn)),
        Err(e @ ConversationError::UnknownSession(_)) => {
            log::warn!("Rejected message: {}", e);
            HttpResponse::NotFound().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

#[get("/mood/{session_id}")]
async fn get_mood(path: web::Path<Uuid>, data: web::Data<AppState>) -> impl Responder {
    let session_id = path.into_inner();
    match data.conversations.mood(session_id) {
        Some(state) => HttpResponse::Ok().json(state),
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: ConversationError::UnknownSession(session_id).to_string(),
        }),
    }
}

#[get("/get_initial_questions")]
async fn get_initial_questions() -> impl Responder {
    HttpResponse::Ok().json(QuestionsResponse {
        questions: INITIAL_QUESTIONS,
    })
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(chat)
        .service(get_response)
        .service(get_mood)
        .service(get_initial_questions);
}

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_file(Path::new(&path))?,
        None => Settings::load("Config")?,
    };
    let dataset = Arc::new(Dataset::load(&settings.data)?);

    let model = OllamaCli::new(
        settings.model.program.clone(),
        settings.model.name.clone(),
        settings.model.timeout(),
    );
    let fallback = FallbackResponder::new(Arc::new(model), settings.model.max_words);
    let matcher = IntentMatcher::new(dataset, settings.matching.clone(), fallback);

    let data = web::Data::new(AppState {
        conversations: ConversationManager::with_ttl(settings.server.session_ttl()),
        matcher,
    });

    let host = settings.server.host.clone();
    let port = settings.server.port;
    log::info!("Starting server at http://{}:{}", host, port);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .bind((host, port))?
        .run()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{intent, mood_table};
    use crate::dataset::Corpus;
    use crate::fallback::tests::FakeModel;
    use crate::matcher::{MatchPolicy, DEFAULT_REPLY};
    use actix_web::test;
    use serde_json::Value;

    fn app_state() -> web::Data<AppState> {
        let dataset = Dataset::new(
            Corpus::new(vec![intent("greeting", &["hello"], &["Hi there!"])], vec![]),
            mood_table(),
        )
        .unwrap();
        let matcher = IntentMatcher::new(
            Arc::new(dataset),
            MatchPolicy::default(),
            FallbackResponder::new(Arc::new(FakeModel::unavailable()), 300),
        );
        web::Data::new(AppState {
            conversations: ConversationManager::new(),
            matcher,
        })
    }

    #[actix_web::test]
    async fn full_session_over_http() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;

        let req = test::TestRequest::post().uri("/chat").to_request();
        let started: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(started["first_question"], INITIAL_QUESTIONS[0]);
        let session_id = started["session_id"].as_str().unwrap().to_string();

        let send = |message: &str| {
            test::TestRequest::post()
                .uri("/get_response")
                .set_json(serde_json::json!({ "session_id": session_id, "message": message }))
                .to_request()
        };

        for (i, expected) in INITIAL_QUESTIONS[1..].iter().enumerate() {
            let body: Value = test::call_and_read_body_json(&app, send(&format!("answer {i}"))).await;
            assert_eq!(body["response"], *expected);
            assert!(body.get("assessment_complete").is_none());
        }
        let body: Value = test::call_and_read_body_json(&app, send("done")).await;
        assert_eq!(body["assessment_complete"], true);

        let body: Value = test::call_and_read_body_json(&app, send("hello")).await;
        assert_eq!(body["response"], "Hi there!");

        let body: Value = test::call_and_read_body_json(&app, send("quantum physics")).await;
        assert_eq!(body["response"], DEFAULT_REPLY);

        let body: Value = test::call_and_read_body_json(&app, send("I am sad today")).await;
        assert_eq!(body["response"], DEFAULT_REPLY);
        let req = test::TestRequest::get()
            .uri(&format!("/mood/{session_id}"))
            .to_request();
        let mood: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mood["current_mood"], "sad");
        assert_eq!(mood["mood_score"], 4);
        assert_eq!(mood["conversation_keywords"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn unknown_session_is_not_found() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri("/get_response")
            .set_json(serde_json::json!({ "session_id": Uuid::new_v4(), "message": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn new_chat_closes_previous_session() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;

        let req = test::TestRequest::post().uri("/chat").to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        let old = first["session_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(serde_json::json!({ "session_id": old }))
            .to_request();
        let second: Value = test::call_and_read_body_json(&app, req).await;
        assert_ne!(second["session_id"], first["session_id"]);

        let req = test::TestRequest::get().uri(&format!("/mood/{old}")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/mood/{}", second["session_id"].as_str().unwrap()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
    }

    #[actix_web::test]
    async fn lists_initial_questions() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let req = test::TestRequest::get()
            .uri("/get_initial_questions")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["questions"].as_array().unwrap().len(), 5);
    }
}
