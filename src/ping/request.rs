use super::protocol::{
    DCC_CGI_VARIABLE, FINANCIAL_PING_PATH, MACHINE_ID_CGI_VARIABLE, PRODUCT_BRAND_CGI_VARIABLE,
    PRODUCT_ID_CGI_VARIABLE, PRODUCT_LANGUAGE_CGI_VARIABLE, PRODUCT_SIGNATURE_CGI_VARIABLE,
    PROTOCOL_CGI_ARGUMENT, RLZ_CGI_INDICATOR, RLZ_CGI_SEPARATOR, RLZ_CGI_VARIABLE,
};
use crate::error::{Result, RlzError};
use crate::model::types::AccessPoint;

/// What the caller wants to report in a financial ping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingRequest {
    /// Access points whose RLZs are reported while the product has pending events.
    pub points: Vec<AccessPoint>,
    /// Product signature, sent as `as=`. Required.
    pub signature: String,
    pub brand: String,
    pub product_id: String,
    pub language: String,
    pub exclude_machine_id: bool,
}

impl PingRequest {
    pub fn new(signature: impl Into<String>, points: Vec<AccessPoint>) -> Self {
        Self {
            points,
            signature: signature.into(),
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn excluding_machine_id(mut self) -> Self {
        self.exclude_machine_id = true;
        self
    }
}

/// `rep=2&rlz=<AP>:<value>,...[&dcc=<dcc>]`.
///
/// `rlzs` is emitted in the given order. The `rlz=` field is present even
/// when there is nothing to report; `dcc=` only when a code is set.
pub fn ping_params(rlzs: &[(AccessPoint, String)], dcc: Option<&str>) -> String {
    let entries: Vec<String> = rlzs
        .iter()
        .map(|(point, value)| format!("{}{}{}", point.code(), RLZ_CGI_INDICATOR, value))
        .collect();

    let mut cgi = format!(
        "{}&{}={}",
        PROTOCOL_CGI_ARGUMENT,
        RLZ_CGI_VARIABLE,
        entries.join(RLZ_CGI_SEPARATOR)
    );
    if let Some(dcc) = dcc.filter(|dcc| !dcc.is_empty()) {
        cgi.push_str(&format!("&{}={}", DCC_CGI_VARIABLE, dcc));
    }
    cgi
}

/// Assembles the request path sent to the financial server.
///
/// `events_cgi` is the full `events=...` fragment, `params` the output of
/// [`ping_params`].
pub fn form_request(
    request: &PingRequest,
    machine_id: Option<&str>,
    events_cgi: Option<&str>,
    params: &str,
) -> Result<String> {
    if request.signature.is_empty() {
        return Err(RlzError::InvalidArgument("product signature is required"));
    }

    let mut url = format!(
        "{}?{}={}",
        FINANCIAL_PING_PATH, PRODUCT_SIGNATURE_CGI_VARIABLE, request.signature
    );

    let optional = [
        (PRODUCT_BRAND_CGI_VARIABLE, request.brand.as_str()),
        (PRODUCT_ID_CGI_VARIABLE, request.product_id.as_str()),
        (PRODUCT_LANGUAGE_CGI_VARIABLE, request.language.as_str()),
        (MACHINE_ID_CGI_VARIABLE, machine_id.unwrap_or_default()),
    ];
    for (name, value) in optional {
        if !value.is_empty() {
            url.push_str(&format!("&{}={}", name, value));
        }
    }

    if let Some(events) = events_cgi.filter(|events| !events.is_empty()) {
        url.push('&');
        url.push_str(events);
    }

    url.push('&');
    url.push_str(params);
    Ok(url)
}
