//! Client library for connecting to a BandHub server
//!
//! Wraps request framing and remembers the credentials of the last
//! successful `login`/`register` so later commands are sent authenticated.

use crate::codec::{encode_frame, FrameDecoder};
use crate::error::{BandHubError, Result};
use crate::model::{Band, BandDraft};
use crate::protocol::{CollectionInfo, Command, Credentials, Payload, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Client for connecting to a BandHub server
pub struct Client {
    stream: TcpStream,
    decoder: FrameDecoder,
    credentials: Option<Credentials>,
}

impl Client {
    /// Connect to a BandHub server
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::default(),
            credentials: None,
        })
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Send a raw request and wait for its response
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        let frame = encode_frame(request)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    async fn read_response(&mut self) -> Result<Response> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(response) = self.decoder.decode::<Response>()? {
                return Ok(response);
            }
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                return Err(BandHubError::Client(
                    "server closed the connection".to_string(),
                ));
            }
            self.decoder.extend(&chunk[..read]);
        }
    }

    /// Send a command with the stored credentials attached
    pub async fn request(&mut self, command: Command) -> Result<Response> {
        let request = Request {
            credentials: self.credentials.clone(),
            command,
        };
        self.send(&request).await
    }

    async fn identify(&mut self, command: Command, username: &str, password: &str) -> Result<Response> {
        let credentials = Credentials::new(username, password);
        let response = self
            .send(&Request::authenticated(command, credentials.clone()))
            .await?;
        if response.is_success() {
            self.credentials = Some(credentials);
        }
        Ok(response)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Response> {
        self.identify(Command::Login, username, password).await
    }

    pub async fn register(&mut self, username: &str, password: &str) -> Result<Response> {
        self.identify(Command::Register, username, password).await
    }

    /// Fetch the whole collection
    pub async fn load(&mut self) -> Result<Vec<Band>> {
        let response = self.request(Command::Load).await?;
        match response.payload {
            Some(Payload::Collection(bands)) if response.is_success() => Ok(bands),
            _ => Err(BandHubError::Client(format!(
                "unexpected response to load: {}",
                response.message
            ))),
        }
    }

    pub async fn info(&mut self) -> Result<CollectionInfo> {
        let response = self.request(Command::Info).await?;
        match response.payload {
            Some(Payload::Info(info)) if response.is_success() => Ok(info),
            _ => Err(BandHubError::Client(format!(
                "unexpected response to info: {}",
                response.message
            ))),
        }
    }

    pub async fn add(&mut self, band: BandDraft) -> Result<Response> {
        self.request(Command::Add { band }).await
    }

    pub async fn insert_at(&mut self, index: i64, band: BandDraft) -> Result<Response> {
        self.request(Command::InsertAt { index, band }).await
    }

    pub async fn remove(&mut self, id: i64) -> Result<Response> {
        self.request(Command::Remove { id }).await
    }

    pub async fn update(&mut self, id: i64, band: BandDraft) -> Result<Response> {
        self.request(Command::Update { id, band }).await
    }

    pub async fn clear(&mut self) -> Result<Response> {
        self.request(Command::Clear).await
    }

    pub async fn add_if_min(&mut self, band: BandDraft) -> Result<Response> {
        self.request(Command::AddIfMin { band }).await
    }

    pub async fn add_if_max(&mut self, band: BandDraft) -> Result<Response> {
        self.request(Command::AddIfMax { band }).await
    }

    /// Number of bands whose genre precedes `genre`
    pub async fn count_lesser_genre(&mut self, genre: &str) -> Result<u64> {
        let response = self
            .request(Command::CountLesserGenre {
                genre: genre.to_string(),
            })
            .await?;
        match response.payload {
            Some(Payload::Count(count)) if response.is_success() => Ok(count),
            _ => Err(BandHubError::Server(response.message)),
        }
    }

    /// Run several commands as one script; each is sent with the stored credentials
    pub async fn execute_script(&mut self, commands: Vec<Command>) -> Result<Response> {
        let requests = commands.into_iter().map(Request::new).collect();
        self.request(Command::ExecuteScript { requests }).await
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
