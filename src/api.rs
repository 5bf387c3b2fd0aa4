use std::io;
use std::path::PathBuf;

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use reqwest::header::{self, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use url::Url;
use vklass_utils::{credentials::Credentials, regex};

use crate::config::PortalConfig;
use crate::error::{preview, PortalError};
use crate::parser::login_form::{FormMethod, FormParser, RegexFormParser};
use crate::parser::students::{HeuristicStudentScraper, StudentScraper};
use crate::schema::{CalendarEvent, NewsItem, NewsPage, StudentId, StudentRoster};
use crate::session::Session;
use crate::transport::{Fetch, PortalRequest, PortalResponse, ReqwestFetch, RequestFlags};

pub const NEWS_PATH: &str = "/Home/NewsArticles";
pub const CALENDAR_PATH: &str = "/Events/FullCalendar";
pub const WELCOME_PATH: &str = "/Home/Welcome/";

pub struct PortalClientInitializer {
    pub portal: PortalConfig,
    pub credentials: Credentials,
    pub session_path: PathBuf,
}

/// A client bound to one portal session.
///
/// Operations take `&mut self`: the session is updated by every response,
/// so requests against one client are necessarily sequential.
pub struct PortalClient<F = ReqwestFetch> {
    fetch: F,
    portal: PortalConfig,
    credentials: Credentials,
    session: Session,
    session_path: PathBuf,
    form_parser: Box<dyn FormParser>,
    student_scraper: Box<dyn StudentScraper>,
}

impl PortalClient<ReqwestFetch> {
    pub fn new(args: PortalClientInitializer) -> Result<Self, PortalError> {
        let fetch = ReqwestFetch::new(&args.portal.user_agent)?;
        Ok(Self::with_fetch(fetch, args))
    }
}

impl<F: Fetch> PortalClient<F> {
    /// Loads the persisted session, if any.
    pub fn with_fetch(fetch: F, args: PortalClientInitializer) -> Self {
        let session = Session::load_or_default(&args.session_path);
        Self {
            fetch,
            portal: args.portal,
            credentials: args.credentials,
            session,
            session_path: args.session_path,
            form_parser: Box::new(RegexFormParser),
            student_scraper: Box::new(HeuristicStudentScraper),
        }
    }

    pub fn with_form_parser(mut self, form_parser: impl FormParser + 'static) -> Self {
        self.form_parser = Box::new(form_parser);
        self
    }

    pub fn with_student_scraper(mut self, student_scraper: impl StudentScraper + 'static) -> Self {
        self.student_scraper = Box::new(student_scraper);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub fn fetcher(&self) -> &F {
        &self.fetch
    }

    pub fn save_session(&self) -> io::Result<()> {
        self.session.save(&self.session_path)?;
        debug!("Saved the session to {:?}", self.session_path);
        Ok(())
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        Ok(self.portal.base_url.join(path)?)
    }

    /// Sends `request` with the session attached and follows redirects.
    ///
    /// If the portal answers with its login page instead, logs in once and
    /// repeats the request.  A failed login is not an error here: the login
    /// page itself is returned and the caller decides what to make of it.
    pub async fn request_with_session(
        &mut self,
        mut request: PortalRequest,
    ) -> Result<PortalResponse, PortalError> {
        loop {
            let response = self.send_following_redirects(request.clone()).await?;
            if !self.should_detect_login(&request, &response)
                || !looks_like_login_page(&response.text())
            {
                return Ok(response);
            }

            info!("Got a login page for {}; trying to log in.", request.url);
            if let Err(e) = self.authenticate().await {
                warn!("Automatic login failed: {e}");
                return Ok(response);
            }
            if !self.session.is_empty() {
                if let Err(e) = self.save_session() {
                    warn!("Failed to save the session: {e}");
                }
            }
            request.flags = RequestFlags {
                retried: true,
                skip_login_detect: true,
            };
        }
    }

    fn should_detect_login(&self, request: &PortalRequest, response: &PortalResponse) -> bool {
        !request.flags.retried
            && !request.flags.skip_login_detect
            && !request.url.as_str().contains(self.portal.login_url.as_str())
            && response.is_html_or_text()
    }

    /// One round trip per hop, with the current session attached to each.
    async fn send_following_redirects(
        &mut self,
        mut request: PortalRequest,
    ) -> Result<PortalResponse, PortalError> {
        let mut hops = 0;
        loop {
            let mut outgoing = request.clone();
            if let Some(cookie) = self.session.cookie_header() {
                outgoing
                    .headers
                    .insert(header::COOKIE, HeaderValue::from_str(&cookie)?);
            }
            let response = self.fetch.fetch(outgoing).await?;
            self.session.merge_from_headers(&response.headers);
            debug!("{} {} -> {}", request.method, request.url, response.status);

            if !response.status.is_redirection() {
                return Ok(response);
            }
            let Some(location) = response.location() else {
                return Ok(response);
            };
            let next = request.url.join(location)?;
            if hops == self.portal.max_redirects {
                return Err(PortalError::TooManyRedirects {
                    limit: self.portal.max_redirects,
                    url: next,
                });
            }
            hops += 1;
            debug!("Following redirect #{hops} to {next}");

            request.method = Method::GET;
            request.url = next;
            request.body = None;
            request.headers.remove(header::CONTENT_TYPE);
            request.headers.remove(header::CONTENT_LENGTH);
        }
    }

    /// Logs in with the configured credentials.
    ///
    /// Succeeds iff the session holds at least one cookie afterwards.
    /// The session is not saved here.
    pub async fn authenticate(&mut self) -> Result<(), PortalError> {
        if !self.credentials.is_complete() {
            return Err(PortalError::MissingCredentials);
        }
        info!("Trying to log in.");

        let login_url = self.portal.login_url.clone();
        let page = self
            .send_following_redirects(PortalRequest::get(login_url.clone()))
            .await?;
        let form = self
            .form_parser
            .parse_form(&page.text())
            .ok_or_else(|| PortalError::FormNotFound {
                url: login_url.clone(),
            })?;
        debug!("Login form fields: {:?}", form.fields.keys().collect_vec());

        let fields = fill_credentials(form.fields, &self.credentials);
        let body = serde_html_form::to_string(&fields)?;
        let mut action = login_url.join(&form.action)?;
        let request = match form.method {
            FormMethod::Get => {
                action.set_query(Some(&body));
                PortalRequest::get(action)
            }
            FormMethod::Post => PortalRequest::post_form(action, body),
        }
        .header(header::REFERER, HeaderValue::from_str(login_url.as_str())?)
        .flags(RequestFlags {
            retried: false,
            skip_login_detect: true,
        });

        let response = self.send_following_redirects(request).await?;
        if self.session.is_empty() {
            return Err(PortalError::LoginRejected {
                preview: preview(&response.text()),
            });
        }
        info!("Successfully logged in.");
        Ok(())
    }

    /// `GET /`
    pub async fn fetch_home(&mut self) -> Result<PortalResponse, PortalError> {
        let url = self.portal.base_url.clone();
        self.request_with_session(PortalRequest::get(url)).await
    }

    pub async fn download(&mut self, url: Url) -> Result<PortalResponse, PortalError> {
        self.request_with_session(PortalRequest::get(url)).await
    }

    pub async fn get_news_page(&mut self, page_token: Option<&str>) -> Result<NewsPage, PortalError> {
        let mut url = self.endpoint(NEWS_PATH)?;
        if let Some(page_token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", page_token);
        }
        let response = self.request_with_session(PortalRequest::get(url)).await?;
        if !response.status.is_success() {
            return Err(PortalError::FeedFetchFailed {
                status: response.status,
                preview: preview(&response.text()),
            });
        }
        if !response.is_json() {
            return Err(PortalError::UnexpectedContentType {
                content_type: response.content_type().to_owned(),
                preview: preview(&response.text()),
            });
        }
        Ok(response.json()?)
    }

    /// Every news item, following the page tokens until a page has none.
    pub async fn get_all_news(&mut self) -> Result<Vec<NewsItem>, PortalError> {
        let mut items = vec![];
        let mut page_token = None::<String>;
        loop {
            let page = self.get_news_page(page_token.as_deref()).await?;
            let next = page.next_page_token().map(str::to_owned);
            debug!("Got {} news items; next page: {next:?}", page.items.len());
            items.extend(page.items);
            match next {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }

    pub async fn get_calendar_events(
        &mut self,
        student_ids: &[StudentId],
        start: &str,
        end: &str,
    ) -> Result<Vec<CalendarEvent>, PortalError> {
        #[derive(Debug, Serialize)]
        struct CalendarQuery<'a> {
            students: String,
            start: &'a str,
            end: &'a str,
        }
        let body = serde_html_form::to_string(CalendarQuery {
            students: student_ids.iter().join(","),
            start,
            end,
        })?;
        let url = self.endpoint(CALENDAR_PATH)?;
        let response = self
            .request_with_session(PortalRequest::post_form(url, body))
            .await?;
        if !response.status.is_success() {
            return Err(PortalError::CalendarFetchFailed {
                status: response.status,
                preview: preview(&response.text()),
            });
        }
        Ok(response.json()?)
    }

    /// Every student on the welcome page, with a display name for each.
    pub async fn discover_students(&mut self) -> Result<StudentRoster, PortalError> {
        let html = self.welcome_page().await?;
        let roster = self.student_scraper.roster(&html);
        info!("Discovered {} students", roster.len());
        Ok(roster)
    }

    /// Sorted ids of the students on the welcome page, without names.
    pub async fn discover_student_ids(&mut self) -> Result<Vec<StudentId>, PortalError> {
        let html = self.welcome_page().await?;
        Ok(self.student_scraper.student_ids(&html).into_iter().collect())
    }

    async fn welcome_page(&mut self) -> Result<String, PortalError> {
        let url = self.endpoint(WELCOME_PATH)?;
        let response = self.request_with_session(PortalRequest::get(url)).await?;
        Ok(response.text().into_owned())
    }
}

pub fn looks_like_login_page(html: &str) -> bool {
    regex!(r#"(?i)login[^>]*form|name=["']?username|name=["']?password|credentials"#).is_match(html)
}

/// Puts the credentials into the fields that look like username and password,
/// leaving every other field (CSRF tokens and the like) as scraped.
fn fill_credentials(
    mut fields: IndexMap<String, String>,
    credentials: &Credentials,
) -> IndexMap<String, String> {
    let password_field = fields
        .keys()
        .find(|name| regex!(r"(?i)pass|password").is_match(name))
        .cloned()
        .unwrap_or_else(|| "password".to_owned());
    let username_field = fields
        .keys()
        .filter(|&name| name != &password_field)
        .find(|name| regex!(r"(?i)user|username|email|login").is_match(name))
        .cloned()
        .unwrap_or_else(|| "username".to_owned());
    fields.insert(username_field, credentials.username.as_str().to_owned());
    fields.insert(password_field, credentials.password.as_str().to_owned());
    fields
}
