//! HTTP server for the SMS webhook and the admin API.

mod http;
mod types;

pub use http::{read_request, FormPart, HttpResponse, Request};
pub use types::ApiResponse;

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::consent::messages::EMPTY_TWIML;
use crate::consent::{record_inbound, send_reply};
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::error::{SurveyError, SurveyResult};
use crate::export::{export_csv, export_filename};
use crate::ingest::{ingest_participants, parse_phone_list};
use crate::sms::SmsSender;
use types::{
    Cleared, ConsentSent, HealthResponse, MassSmsRequest, ParticipantList, PhoneListRequest,
    PhoneUpload, ResetResult, SearchRequest, TargetedSurveyRequest, UploadResult,
};

/// Shared state for request handlers. Each request opens its own
/// database connection.
struct ServerContext {
    config: Config,
    sender: Arc<dyn SmsSender>,
    start_time: Instant,
}

pub struct SurveyServer {
    ctx: Arc<ServerContext>,
}

impl SurveyServer {
    pub fn new(config: Config, sender: Arc<dyn SmsSender>) -> Result<Self> {
        // Fail early if the database can't be opened or migrated
        let db = Database::open_at(&config.db_path)?;
        info!(
            db = %config.db_path.display(),
            participants = db.count_participants()?,
            sender = sender.name(),
            sms_ready = sender.is_ready(),
            "survey server initialised"
        );
        if !sender.is_ready() {
            warn!("SMS credentials incomplete; every send will fail");
        }

        Ok(Self {
            ctx: Arc::new(ServerContext {
                config,
                sender,
                start_time: Instant::now(),
            }),
        })
    }

    /// Accept connections until `shutdown` is set. Blocks.
    pub fn start(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.ctx.config.port))?;
        listener.set_nonblocking(true)?;

        info!(port = self.ctx.config.port, "listening");

        while !shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    let ctx = Arc::clone(&self.ctx);
                    thread::spawn(move || {
                        if let Err(e) = ctx.handle_connection(stream) {
                            warn!(%peer, error = %e, "request error");
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }

        info!("server stopped");
        Ok(())
    }

    /// Handle a parsed request without touching the network.
    pub fn route(&self, request: &Request) -> HttpResponse {
        self.ctx.route(request)
    }
}

impl ServerContext {
    fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;
        stream.set_write_timeout(Some(Duration::from_secs(30)))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let request = match read_request(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                let response = HttpResponse::json(400, &ApiResponse::err(e.to_string()));
                return response.write_to(&mut stream);
            }
        };

        let response = self.route(&request);
        info!(
            method = request.method.as_str(),
            path = request.path.as_str(),
            status = response.status,
            "request"
        );
        response.write_to(&mut stream)
    }

    fn route(&self, req: &Request) -> HttpResponse {
        let result = match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/webhook") => return self.handle_webhook(req),

            ("GET", "/health") => self.handle_health(),
            ("GET", "/participants") => self.handle_participants(),
            ("GET", "/filter_options") => self.handle_filter_options(),
            ("GET", "/export_data") => self.handle_export(),

            ("POST", "/send_consent") => self.handle_send_consent(req),
            ("POST", "/send_bulk_consent") => self.handle_bulk_consent(req),
            ("POST", "/upload_csv") => self.handle_upload_csv(req),
            ("POST", "/send_survey") => self.handle_send_survey(req),
            ("POST", "/search_participants") => self.handle_search(req),
            ("POST", "/send_targeted_survey") => self.handle_targeted_survey(req),
            ("POST", "/mass_sms_upload") => self.handle_mass_sms_upload(req),
            ("POST", "/send_mass_sms") => self.handle_send_mass_sms(req),
            ("POST", "/clear_database") => self.handle_clear(),
            ("POST", "/reset_survey_status") => self.handle_reset(),

            _ => Err(SurveyError::NotFound(format!("{} {}", req.method, req.path))),
        };

        result.unwrap_or_else(|e| {
            if e.http_status() >= 500 {
                error!(path = req.path.as_str(), error = %e, "request failed");
            }
            HttpResponse::json(e.http_status(), &ApiResponse::err(e.to_string()))
        })
    }

    fn open_db(&self) -> SurveyResult<Database> {
        Ok(Database::open_at(&self.config.db_path)?)
    }

    fn dispatcher<'a>(&'a self, db: &'a Database) -> Dispatcher<'a> {
        Dispatcher::new(db, self.sender.as_ref(), self.config.send_delay)
    }

    // ==================== WEBHOOK ====================

    /// Always answers 200 with empty TwiML. The acknowledgement SMS goes out
    /// on its own thread so the provider is never kept waiting.
    fn handle_webhook(&self, req: &Request) -> HttpResponse {
        let form = req.form();
        let from = form.get("From").map(String::as_str).unwrap_or("");
        let body = form.get("Body").map(String::as_str).unwrap_or("");

        let outcome = self
            .open_db()
            .and_then(|db| record_inbound(&db, from, body).map_err(SurveyError::from));

        match outcome {
            Ok(outcome) if !outcome.from.trim().is_empty() => {
                let sender = Arc::clone(&self.sender);
                thread::spawn(move || send_reply(sender.as_ref(), &outcome));
            }
            Ok(_) => warn!("inbound message without a sender number"),
            Err(e) => error!(from, error = %e, "could not process inbound message"),
        }

        HttpResponse::xml(EMPTY_TWIML)
    }

    // ==================== QUERIES ====================

    fn handle_health(&self) -> SurveyResult<HttpResponse> {
        let db = self.open_db()?;
        let health = HealthResponse {
            uptime_secs: self.start_time.elapsed().as_secs(),
            participants: db.count_participants()?,
            responses: db.count_responses()?,
            sms_sender: self.sender.name().to_string(),
            sms_ready: self.sender.is_ready(),
            version: env!("CARGO_PKG_VERSION"),
        };
        Ok(HttpResponse::json(200, &ApiResponse::ok("ok", health)))
    }

    fn handle_participants(&self) -> SurveyResult<HttpResponse> {
        let list = ParticipantList::from(self.open_db()?.list_participants()?);
        let message = format!("{} participants", list.count);
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, list)))
    }

    fn handle_filter_options(&self) -> SurveyResult<HttpResponse> {
        let options = self.open_db()?.filter_options()?;
        Ok(HttpResponse::json(200, &ApiResponse::ok("Filter options", options)))
    }

    fn handle_search(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let request: SearchRequest = req.json()?;
        let list = ParticipantList::from(self.open_db()?.search_participants(&request.filters)?);
        let message = format!("Found {} matching participants", list.count);
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, list)))
    }

    fn handle_export(&self) -> SurveyResult<HttpResponse> {
        let csv = export_csv(&self.open_db()?)?;
        Ok(HttpResponse::csv_attachment(csv, &export_filename(&Utc::now())))
    }

    // ==================== CONSENT ====================

    fn handle_send_consent(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let form = req.form();
        let phone = form.get("phone_number").map(String::as_str).unwrap_or("");

        let db = self.open_db()?;
        let phone = self.dispatcher(&db).send_consent(phone)?;

        let message = format!("Consent request sent to {}", phone);
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, ConsentSent { phone })))
    }

    fn handle_bulk_consent(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let request: PhoneListRequest = req.json()?;
        if request.phone_numbers.is_empty() {
            return Err(SurveyError::invalid("No phone numbers provided"));
        }

        let db = self.open_db()?;
        let summary = self.dispatcher(&db).solicit_consent(&request.phone_numbers)?;

        let message = format!(
            "Consent requests sent to {} of {} numbers",
            summary.success.len(),
            summary.total()
        );
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, summary)))
    }

    fn handle_upload_csv(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let parts = req.multipart()?;
        let file = uploaded_file(&parts)?;
        let send_immediately = parts
            .iter()
            .find(|p| p.name == "send_immediately")
            .map(|p| String::from_utf8_lossy(&p.data).trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let db = self.open_db()?;
        let report = ingest_participants(&db, &file.data)?;

        let consent = if send_immediately {
            Some(self.dispatcher(&db).solicit_consent(&report.summary.success)?)
        } else {
            None
        };

        let mut message = format!("Imported {} participants", report.summary.success.len());
        if let Some(ref consent) = consent {
            message.push_str(&format!(
                "; consent requests sent to {}",
                consent.success.len()
            ));
        }
        Ok(HttpResponse::json(
            200,
            &ApiResponse::ok(message, UploadResult { report, consent }),
        ))
    }

    // ==================== SURVEYS ====================

    fn handle_send_survey(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let form = req.form();
        let survey_url = form.get("survey_url").map(String::as_str).unwrap_or("");
        let custom_message = form.get("custom_message").map(String::as_str);

        let db = self.open_db()?;
        let summary = self
            .dispatcher(&db)
            .send_survey_to_consented(survey_url, custom_message)?;

        let message = if summary.total() == 0 {
            "No consented participants are waiting for a survey".to_string()
        } else {
            format!("Survey sent to {} participants", summary.success.len())
        };
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, summary)))
    }

    fn handle_targeted_survey(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let request: TargetedSurveyRequest = req.json()?;
        let custom_message = request.custom_message.as_deref();

        let db = self.open_db()?;
        let dispatcher = self.dispatcher(&db);
        let summary = match (request.phone_numbers, request.filters) {
            (Some(phones), _) if !phones.is_empty() => {
                dispatcher.send_targeted_survey(&phones, &request.survey_url, custom_message)?
            }
            (_, Some(filter)) => {
                dispatcher.send_filtered_survey(&filter, &request.survey_url, custom_message)?
            }
            _ => return Err(SurveyError::invalid("No phone numbers provided")),
        };

        let message = format!("Survey sent to {} participants", summary.success.len());
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, summary)))
    }

    // ==================== MASS SMS ====================

    fn handle_mass_sms_upload(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let parts = req.multipart()?;
        let file = uploaded_file(&parts)?;
        let list = parse_phone_list(&file.data)?;

        let upload = PhoneUpload {
            count: list.phones.len(),
            phone_numbers: list.phones,
            rejected: list.rejected,
        };
        let message = format!("Found {} valid phone numbers", upload.count);
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, upload)))
    }

    fn handle_send_mass_sms(&self, req: &Request) -> SurveyResult<HttpResponse> {
        let request: MassSmsRequest = req.json()?;
        if request.phone_numbers.is_empty() {
            return Err(SurveyError::invalid("No phone numbers provided"));
        }

        let db = self.open_db()?;
        let summary = self
            .dispatcher(&db)
            .send_mass_sms(&request.phone_numbers, &request.message)?;

        let message = format!(
            "Message sent to {} of {} numbers",
            summary.success.len(),
            summary.total()
        );
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, summary)))
    }

    // ==================== MAINTENANCE ====================

    fn handle_clear(&self) -> SurveyResult<HttpResponse> {
        let (participants, responses) = self.open_db()?.clear_all()?;
        warn!(participants, responses, "database cleared");
        let cleared = Cleared {
            participants_deleted: participants,
            responses_deleted: responses,
        };
        Ok(HttpResponse::json(200, &ApiResponse::ok("Database cleared", cleared)))
    }

    fn handle_reset(&self) -> SurveyResult<HttpResponse> {
        let reset = self.open_db()?.reset_survey_sent()?;
        let message = format!("Survey status reset for {} participants", reset);
        Ok(HttpResponse::json(200, &ApiResponse::ok(message, ResetResult { reset })))
    }
}

/// The `file` part of an upload form.
fn uploaded_file(parts: &[FormPart]) -> SurveyResult<&FormPart> {
    let file = parts
        .iter()
        .find(|p| p.name == "file")
        .ok_or_else(|| SurveyError::invalid("No file uploaded"))?;
    if file.filename.as_deref().map_or(true, |f| f.trim().is_empty()) {
        return Err(SurveyError::invalid("No file selected"));
    }
    Ok(file)
}
