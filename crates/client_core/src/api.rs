use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        Employee, EmployeeId, Farmer, FarmerId, LenientRows, Registration, RegistrationId,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AssignFarmerRequest, AssignmentRecord, BulkAssignRequest, KycUpdateRequest,
        RegistrationStatusRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::error::{CoreError, CoreResult};

/// Backend seam: list and mutation endpoints the console core talks to.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn list_farmers(&self) -> CoreResult<Vec<Farmer>>;
    async fn list_employees(&self) -> CoreResult<Vec<Employee>>;
    async fn list_registrations(&self) -> CoreResult<Vec<Registration>>;
    async fn bulk_assign(&self, request: &BulkAssignRequest) -> CoreResult<Vec<AssignmentRecord>>;
    async fn assign_farmer(
        &self,
        farmer_id: FarmerId,
        employee_id: EmployeeId,
    ) -> CoreResult<AssignmentRecord>;
    async fn update_kyc_status(
        &self,
        farmer_id: FarmerId,
        request: &KycUpdateRequest,
    ) -> CoreResult<()>;
    async fn update_registration_status(
        &self,
        registration_id: RegistrationId,
        request: &RegistrationStatusRequest,
    ) -> CoreResult<()>;
}

pub struct MissingConsoleApi;

#[async_trait]
impl ConsoleApi for MissingConsoleApi {
    async fn list_farmers(&self) -> CoreResult<Vec<Farmer>> {
        Err(CoreError::Unavailable)
    }

    async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        Err(CoreError::Unavailable)
    }

    async fn list_registrations(&self) -> CoreResult<Vec<Registration>> {
        Err(CoreError::Unavailable)
    }

    async fn bulk_assign(&self, _request: &BulkAssignRequest) -> CoreResult<Vec<AssignmentRecord>> {
        Err(CoreError::Unavailable)
    }

    async fn assign_farmer(
        &self,
        _farmer_id: FarmerId,
        _employee_id: EmployeeId,
    ) -> CoreResult<AssignmentRecord> {
        Err(CoreError::Unavailable)
    }

    async fn update_kyc_status(
        &self,
        _farmer_id: FarmerId,
        _request: &KycUpdateRequest,
    ) -> CoreResult<()> {
        Err(CoreError::Unavailable)
    }

    async fn update_registration_status(
        &self,
        _registration_id: RegistrationId,
        _request: &RegistrationStatusRequest,
    ) -> CoreResult<()> {
        Err(CoreError::Unavailable)
    }
}

pub struct HttpConsoleApi {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpConsoleApi {
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|err| CoreError::validation(format!("invalid api base url '{base_url}': {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CoreError::validation(
                "api base url must start with http:// or https://",
            ));
        }
        // Url::join drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> CoreResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| CoreError::validation(format!("invalid endpoint '{path}': {err}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CoreResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let res = self.authorize(self.http.get(url)).send().await?;
        read_json(res).await
    }

    /// Lists decode row by row; rows that cannot be read are logged and dropped.
    async fn get_rows<T: DeserializeOwned>(&self, path: &str) -> CoreResult<Vec<T>> {
        self.get_json::<LenientRows<T>>(path)
            .await
            .map(LenientRows::into_inner)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> CoreResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let res = self.authorize(self.http.post(url)).json(body).send().await?;
        read_json(res).await
    }

    async fn post_unit<B>(&self, path: &str, body: &B) -> CoreResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let res = self.authorize(self.http.post(url)).json(body).send().await?;
        ensure_success(res).await.map(|_| ())
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn list_farmers(&self) -> CoreResult<Vec<Farmer>> {
        self.get_rows("farmers").await
    }

    async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        self.get_rows("employees").await
    }

    async fn list_registrations(&self) -> CoreResult<Vec<Registration>> {
        self.get_rows("registrations").await
    }

    async fn bulk_assign(&self, request: &BulkAssignRequest) -> CoreResult<Vec<AssignmentRecord>> {
        self.post_json("farmers/assign/bulk", request).await
    }

    async fn assign_farmer(
        &self,
        farmer_id: FarmerId,
        employee_id: EmployeeId,
    ) -> CoreResult<AssignmentRecord> {
        self.post_json(
            &format!("farmers/{farmer_id}/assign"),
            &AssignFarmerRequest { employee_id },
        )
        .await
    }

    async fn update_kyc_status(
        &self,
        farmer_id: FarmerId,
        request: &KycUpdateRequest,
    ) -> CoreResult<()> {
        self.post_unit(&format!("farmers/{farmer_id}/kyc"), request)
            .await
    }

    async fn update_registration_status(
        &self,
        registration_id: RegistrationId,
        request: &RegistrationStatusRequest,
    ) -> CoreResult<()> {
        self.post_unit(&format!("registrations/{registration_id}/status"), request)
            .await
    }
}

async fn ensure_success(res: Response) -> CoreResult<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

async fn read_json<T: DeserializeOwned>(res: Response) -> CoreResult<T> {
    let res = ensure_success(res).await?;
    let bytes = res.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| CoreError::Decode(err.to_string()))
}

fn error_from_body(status: StatusCode, body: &str) -> CoreError {
    let api_error = match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => api_error,
        Err(_) if body.trim().is_empty() => {
            return CoreError::Network {
                message: format!("request failed with status {status}"),
                status: Some(status.as_u16()),
            }
        }
        Err(_) => {
            return CoreError::Network {
                message: format!("request failed with status {status}: {}", body.trim()),
                status: Some(status.as_u16()),
            }
        }
    };
    match api_error.code {
        ErrorCode::Forbidden => CoreError::Forbidden(api_error.message),
        ErrorCode::Validation => CoreError::Validation(api_error.message),
        _ => CoreError::Network {
            message: api_error.message,
            status: Some(status.as_u16()),
        },
    }
}
