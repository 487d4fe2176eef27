use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("backend authentication failed: {0}")]
	Failed(#[source] anyhow::Error),
	#[error("backend authentication timed out")]
	Timeout,
}

/// Credential injectors, applied after translation so signatures cover the
/// bytes the backend will actually receive. Shared across streams; every
/// handler is reentrant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum BackendAuth {
	/// Bearer token attached as `authorization`.
	Key(SecretString),
	/// Azure OpenAI key attached as `api-key`.
	AzureKey(SecretString),
	#[serde(rename = "aws")]
	Aws(AwsAuth),
}

impl PartialEq for BackendAuth {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(BackendAuth::Key(a), BackendAuth::Key(b)) => a.expose_secret() == b.expose_secret(),
			(BackendAuth::AzureKey(a), BackendAuth::AzureKey(b)) => {
				a.expose_secret() == b.expose_secret()
			},
			(BackendAuth::Aws(a), BackendAuth::Aws(b)) => a == b,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AwsAuth {
	/// Use explicit AWS credentials
	#[serde(rename_all = "camelCase")]
	ExplicitConfig {
		access_key_id: SecretString,
		secret_access_key: SecretString,
		region: String,
		session_token: Option<SecretString>,
	},
	/// Use implicit AWS authentication (environment variables, IAM roles, etc.)
	Implicit {},
}

impl PartialEq for AwsAuth {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(
				AwsAuth::ExplicitConfig {
					access_key_id: a1,
					secret_access_key: a2,
					region: a3,
					session_token: a4,
				},
				AwsAuth::ExplicitConfig {
					access_key_id: b1,
					secret_access_key: b2,
					region: b3,
					session_token: b4,
				},
			) => {
				a1.expose_secret() == b1.expose_secret()
					&& a2.expose_secret() == b2.expose_secret()
					&& a3 == b3
					&& a4.as_ref().map(|s| s.expose_secret()) == b4.as_ref().map(|s| s.expose_secret())
			},
			(AwsAuth::Implicit {}, AwsAuth::Implicit {}) => true,
			_ => false,
		}
	}
}

/// The outbound request as it will leave the proxy: translated path and body,
/// ready to be signed or keyed.
#[derive(Debug, Clone, Copy)]
pub struct PendingRequest<'a> {
	pub method: &'a str,
	pub path: &'a str,
	pub content_type: &'a str,
	pub body: &'a [u8],
}

/// Returns the headers the handler wants set on the outbound request.
pub async fn apply_backend_auth(
	auth: &BackendAuth,
	pending: PendingRequest<'_>,
) -> Result<Vec<(Strng, Strng)>, Error> {
	match auth {
		BackendAuth::Key(k) => Ok(vec![(
			strng::literal!("authorization"),
			strng::format!("Bearer {}", k.expose_secret()),
		)]),
		BackendAuth::AzureKey(k) => Ok(vec![(
			strng::literal!("api-key"),
			strng::new(k.expose_secret()),
		)]),
		BackendAuth::Aws(aws_auth) => aws::sign_request(pending, aws_auth)
			.await
			.map_err(Error::Failed),
	}
}

mod aws {
	use std::time::SystemTime;

	use aws_config::{BehaviorVersion, SdkConfig};
	use aws_credential_types::Credentials;
	use aws_credential_types::provider::ProvideCredentials;
	use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
	use aws_sigv4::sign::v4::SigningParams;
	use secrecy::ExposeSecret;
	use tokio::sync::OnceCell;

	use super::{AwsAuth, PendingRequest};
	use crate::*;

	pub async fn sign_request(
		pending: PendingRequest<'_>,
		aws_auth: &AwsAuth,
	) -> anyhow::Result<Vec<(Strng, Strng)>> {
		let creds = load_credentials(aws_auth).await?.into();
		let region = match aws_auth {
			AwsAuth::ExplicitConfig { region, .. } => region.clone(),
			AwsAuth::Implicit {} => {
				let config = sdk_config().await;
				config
					.region()
					.map(|r| r.as_ref().to_string())
					.ok_or_else(|| anyhow::anyhow!("no region found in AWS config"))?
			},
		};
		let host = format!("bedrock-runtime.{region}.amazonaws.com");
		let uri = format!("https://{host}{}", pending.path);
		trace!("AWS signing with region: {}, service: bedrock", region);

		let signing_params = SigningParams::builder()
			.identity(&creds)
			.region(&region)
			.name("bedrock")
			.time(SystemTime::now())
			.settings(SigningSettings::default())
			.build()?
			.into();

		let headers = [
			("host", host.as_str()),
			("content-type", pending.content_type),
		];
		let signable_request = SignableRequest::new(
			pending.method,
			&uri,
			headers.iter().copied(),
			SignableBody::Bytes(pending.body),
		)?;
		let (signature, _sig) = sign(signable_request, &signing_params)?.into_parts();

		// The signer wants to mutate a real request; hand it a scratch one and
		// lift the resulting headers into the mutation.
		let mut scratch = ::http::Request::builder()
			.method(pending.method)
			.uri(&uri)
			.header("host", &host)
			.header("content-type", pending.content_type)
			.body(())?;
		signature.apply_to_request_http1x(&mut scratch);

		let mut out = Vec::with_capacity(scratch.headers().len());
		for (k, v) in scratch.headers() {
			out.push((strng::new(k.as_str()), strng::new(v.to_str()?)));
		}
		trace!("signed AWS request");
		Ok(out)
	}

	static SDK_CONFIG: OnceCell<SdkConfig> = OnceCell::const_new();
	async fn sdk_config<'a>() -> &'a SdkConfig {
		SDK_CONFIG
			.get_or_init(|| async { aws_config::load_defaults(BehaviorVersion::latest()).await })
			.await
	}

	async fn load_credentials(aws_auth: &AwsAuth) -> anyhow::Result<Credentials> {
		match aws_auth {
			AwsAuth::ExplicitConfig {
				access_key_id,
				secret_access_key,
				session_token,
				region: _,
			} => {
				let mut builder = Credentials::builder()
					.access_key_id(access_key_id.expose_secret())
					.secret_access_key(secret_access_key.expose_secret())
					.provider_name("bedrock");
				if let Some(token) = session_token {
					builder = builder.session_token(token.expose_secret());
				}
				Ok(builder.build())
			},
			AwsAuth::Implicit {} => {
				let config = sdk_config().await;
				let provider = config
					.credentials_provider()
					.ok_or_else(|| anyhow::anyhow!("no AWS credentials provider available"))?;
				Ok(provider.provide_credentials().await?)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn bearer_key() {
		let auth = BackendAuth::Key(SecretString::from("sk-test".to_string()));
		let got = apply_backend_auth(
			&auth,
			PendingRequest {
				method: "POST",
				path: "/v1/chat/completions",
				content_type: "application/json",
				body: b"{}",
			},
		)
		.await
		.unwrap();
		assert_eq!(
			got,
			vec![(strng::literal!("authorization"), strng::new("Bearer sk-test"))]
		);
	}

	#[tokio::test]
	async fn azure_key() {
		let auth = BackendAuth::AzureKey(SecretString::from("azure-test".to_string()));
		let got = apply_backend_auth(
			&auth,
			PendingRequest {
				method: "POST",
				path: "/openai/deployments/gpt-4o/chat/completions",
				content_type: "application/json",
				body: b"{}",
			},
		)
		.await
		.unwrap();
		assert_eq!(got, vec![(strng::literal!("api-key"), strng::new("azure-test"))]);
	}

	#[tokio::test]
	async fn sigv4_emits_signed_headers() {
		let auth = BackendAuth::Aws(AwsAuth::ExplicitConfig {
			access_key_id: SecretString::from("AKIDEXAMPLE".to_string()),
			secret_access_key: SecretString::from("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
			region: "us-east-1".to_string(),
			session_token: None,
		});
		let got = apply_backend_auth(
			&auth,
			PendingRequest {
				method: "POST",
				path: "/model/llama3-70b/converse",
				content_type: "application/json",
				body: b"{\"messages\":[]}",
			},
		)
		.await
		.unwrap();
		let names: Vec<&str> = got.iter().map(|(k, _)| k.as_str()).collect();
		assert!(names.contains(&"authorization"));
		assert!(names.contains(&"x-amz-date"));
		assert!(names.contains(&"host"));
		let authz = &got.iter().find(|(k, _)| k == "authorization").unwrap().1;
		assert!(authz.starts_with("AWS4-HMAC-SHA256"));
		assert!(authz.contains("us-east-1/bedrock/aws4_request"));
	}

	#[test]
	fn auth_equality_ignores_nothing() {
		let a = BackendAuth::Key(SecretString::from("one".to_string()));
		let b = BackendAuth::Key(SecretString::from("one".to_string()));
		let c = BackendAuth::Key(SecretString::from("two".to_string()));
		assert_eq!(a, b);
		assert_ne!(a, c);
	}
}
