//! Command dispatcher
//!
//! Maps each decoded request to its handler, checks authentication and
//! ownership, and keeps the in-memory collection in step with the database.
//! `execute` never fails: every error becomes a FAIL response.

use crate::error::{BandHubError, Result};
use crate::identity::{Identity, IdentityProvider};
use crate::model::{Band, BandDraft, BandFields, MusicGenre};
use crate::persistence::BandRepository;
use crate::protocol::{CollectionInfo, Command, Credentials, Payload, Request, Response};
use crate::store::CollectionStore;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Deepest allowed nesting of `execute_script` requests
pub const MAX_SCRIPT_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

pub struct Dispatcher {
    store: CollectionStore,
    repository: Box<dyn BandRepository>,
    identity: Box<dyn IdentityProvider>,
    initialized_at: DateTime<Utc>,
    last_modified: Option<DateTime<Utc>>,
}

impl Dispatcher {
    /// Build a dispatcher, loading the collection from the repository
    pub fn new(
        repository: Box<dyn BandRepository>,
        identity: Box<dyn IdentityProvider>,
    ) -> Result<Self> {
        let bands = repository.fetch_all()?;
        info!(count = bands.len(), "loaded collection from database");
        Ok(Self {
            store: CollectionStore::hydrate(bands),
            repository,
            identity,
            initialized_at: Utc::now(),
            last_modified: None,
        })
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Execute a request and produce its response
    pub fn execute(&mut self, request: Request) -> Response {
        self.execute_nested(request, 0)
    }

    fn execute_nested(&mut self, request: Request, depth: usize) -> Response {
        let command = request.command.name();
        match self.handle(request, depth) {
            Ok(response) => response,
            Err(err) if err.is_internal() => {
                error!(command, error = %err, "command failed");
                Response::fail("Server error")
            }
            Err(err) => {
                debug!(command, error = %err, "command rejected");
                Response::fail(err.to_string())
            }
        }
    }

    fn handle(&mut self, request: Request, depth: usize) -> Result<Response> {
        let Request {
            credentials,
            command,
        } = request;
        let credentials = credentials.as_ref();

        match command {
            Command::Load => Ok(self.load()),
            Command::Info => Ok(self.info()),
            Command::Add { band } => self.add(credentials, band),
            Command::InsertAt { index, band } => self.insert_at(credentials, index, band),
            Command::Remove { id } => self.remove(credentials, id),
            Command::Update { id, band } => self.update(credentials, id, band),
            Command::Clear => self.clear(credentials),
            Command::AddIfMin { band } => self.add_if_extreme(credentials, band, Extreme::Min),
            Command::AddIfMax { band } => self.add_if_extreme(credentials, band, Extreme::Max),
            Command::CountLesserGenre { genre } => self.count_lesser_genre(&genre),
            Command::ExecuteScript { requests } => {
                Ok(self.execute_script(credentials.cloned(), requests, depth))
            }
            Command::Login => self.login(credentials),
            Command::Register => self.register(credentials),
        }
    }

    fn authenticate(&self, credentials: Option<&Credentials>) -> Result<Identity> {
        let credentials = credentials.ok_or_else(|| {
            BandHubError::AuthorizationDenied("this command requires a logged in user".to_string())
        })?;
        self.identity
            .authenticate(&credentials.username, &credentials.password)
            .map_err(|err| match err {
                BandHubError::AuthFailure(msg) => BandHubError::AuthorizationDenied(msg),
                other => other,
            })
    }

    fn authorize_owner(&self, id: i64, user: &Identity) -> Result<()> {
        let owner = self
            .store
            .owner_of(id)
            .ok_or_else(|| BandHubError::NotFound(format!("band {} does not exist", id)))?;
        // the database has the final say
        if owner != user.username || !self.repository.is_owner(id, &user.username)? {
            return Err(BandHubError::AuthorizationDenied(format!(
                "band {} belongs to another user",
                id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.last_modified = Some(Utc::now());
    }

    /// Persist a new band, then place it at `index` in memory
    fn create(&mut self, owner: &Identity, fields: BandFields, index: usize) -> Result<i64> {
        let creation_date = Utc::now();
        let id = self
            .repository
            .insert(&fields, creation_date, &owner.username)?;
        let band = Band::from_fields(id, creation_date, owner.username.clone(), fields);

        if let Err(err) = self.store.insert_at(index, band) {
            warn!(id, error = %err, "undoing insert that could not be applied in memory");
            self.repository.delete_by_id(id)?;
            return Err(err);
        }
        self.touch();
        Ok(id)
    }

    fn load(&self) -> Response {
        Response::success(format!("Collection holds {} bands", self.store.len()))
            .with_payload(Payload::Collection(self.store.snapshot()))
    }

    fn info(&self) -> Response {
        let info = CollectionInfo {
            element_type: "Band".to_string(),
            size: self.store.len(),
            initialized_at: self.initialized_at,
            last_modified: self.last_modified,
        };
        Response::success("Collection info").with_payload(Payload::Info(info))
    }

    fn add(&mut self, credentials: Option<&Credentials>, draft: BandDraft) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        let fields = draft.validate()?;
        let index = self.store.len();
        let id = self.create(&user, fields, index)?;
        Ok(Response::success(format!("Band {} added", id)).with_payload(Payload::Id(id)))
    }

    fn insert_at(
        &mut self,
        credentials: Option<&Credentials>,
        index: i64,
        draft: BandDraft,
    ) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        let position = usize::try_from(index)
            .ok()
            .filter(|&position| position <= self.store.len())
            .ok_or_else(|| {
                BandHubError::Validation(format!(
                    "index must be between 0 and {}, got {}",
                    self.store.len(),
                    index
                ))
            })?;
        let fields = draft.validate()?;
        let id = self.create(&user, fields, position)?;
        Ok(Response::success(format!("Band {} inserted at position {}", id, index))
            .with_payload(Payload::Id(id)))
    }

    fn remove(&mut self, credentials: Option<&Credentials>, id: i64) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        self.authorize_owner(id, &user)?;
        self.repository.delete_by_id(id)?;
        self.store.remove_by_id(id);
        self.touch();
        Ok(Response::success(format!("Band {} removed", id)))
    }

    fn update(
        &mut self,
        credentials: Option<&Credentials>,
        id: i64,
        draft: BandDraft,
    ) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        self.authorize_owner(id, &user)?;
        let fields = draft.validate()?;
        self.repository.update_by_id(id, &fields)?;
        self.store.replace_by_id(id, fields);
        self.touch();
        Ok(Response::success(format!("Band {} updated", id)))
    }

    fn clear(&mut self, credentials: Option<&Credentials>) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        let deleted = self.repository.delete_all_by_owner(&user.username)?;
        let removed = self
            .store
            .clear_matching(|band| band.owner_username == user.username);
        if removed.len() != deleted {
            warn!(
                user = %user.username,
                in_memory = removed.len(),
                in_database = deleted,
                "clear removed a different number of bands from memory and database"
            );
        }
        if !removed.is_empty() {
            self.touch();
        }
        Ok(Response::success(format!("Removed {} of your bands", removed.len()))
            .with_payload(Payload::Count(removed.len() as u64)))
    }

    fn add_if_extreme(
        &mut self,
        credentials: Option<&Credentials>,
        draft: BandDraft,
        extreme: Extreme,
    ) -> Result<Response> {
        let user = self.authenticate(credentials)?;
        let fields = draft.validate()?;

        let (accepted, rejection) = match extreme {
            Extreme::Min => (
                self.store.min().map_or(true, |min| fields.precedes(min)),
                "Band was not added: it is not smaller than the current minimum",
            ),
            Extreme::Max => (
                self.store.max().map_or(true, |max| fields.follows(max)),
                "Band was not added: it is not greater than the current maximum",
            ),
        };
        if !accepted {
            return Ok(Response::fail(rejection));
        }

        let index = self.store.len();
        let id = self.create(&user, fields, index)?;
        Ok(Response::success(format!("Band {} added", id)).with_payload(Payload::Id(id)))
    }

    fn count_lesser_genre(&self, genre: &str) -> Result<Response> {
        let genre: MusicGenre = genre.parse()?;
        let count = self
            .store
            .iter()
            .filter(|band| matches!(band.genre, Some(g) if g < genre))
            .count();
        Ok(
            Response::success(format!("{} bands have a genre before {}", count, genre))
                .with_payload(Payload::Count(count as u64)),
        )
    }

    fn execute_script(
        &mut self,
        credentials: Option<Credentials>,
        requests: Vec<Request>,
        depth: usize,
    ) -> Response {
        if depth >= MAX_SCRIPT_DEPTH {
            return Response::fail(format!(
                "scripts may be nested at most {} levels deep",
                MAX_SCRIPT_DEPTH
            ));
        }

        let total = requests.len();
        let mut responses = Vec::with_capacity(total);
        for mut request in requests {
            if request.credentials.is_none() {
                request.credentials = credentials.clone();
            }
            responses.push(self.execute_nested(request, depth + 1));
        }

        let failed = responses.iter().filter(|r| !r.is_success()).count();
        let response = if failed == 0 {
            Response::success(format!("Script executed {} commands", total))
        } else {
            Response::fail(format!("{} of {} script commands failed", failed, total))
        };
        response.with_payload(Payload::Script(responses))
    }

    fn login(&self, credentials: Option<&Credentials>) -> Result<Response> {
        let credentials = credentials.ok_or_else(|| {
            BandHubError::Validation("login requires a username and password".to_string())
        })?;
        let identity = self
            .identity
            .authenticate(&credentials.username, &credentials.password)?;
        info!(user = %identity.username, "user logged in");
        Ok(Response::success(format!("Logged in as {}", identity.username)))
    }

    fn register(&self, credentials: Option<&Credentials>) -> Result<Response> {
        let credentials = credentials.ok_or_else(|| {
            BandHubError::Validation("register requires a username and password".to_string())
        })?;
        let identity = self
            .identity
            .register(&credentials.username, &credentials.password)?;
        info!(user = %identity.username, "user registered");
        Ok(Response::success(format!("Registered {}", identity.username)))
    }
}
