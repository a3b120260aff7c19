use std::time::Duration;

use webdelta_client::ReqwestFetcher;
use webdelta_core::error::AppError;
use webdelta_core::traits::Fetcher;

use crate::integration::common::{closed_port_url, spawn_site};

#[tokio::test]
async fn fetches_page_body() {
    let site = spawn_site().await;
    let fetcher = ReqwestFetcher::new().unwrap();

    let body = fetcher.fetch(&site.url("/static")).await.unwrap();
    assert_eq!(body, "static");
}

#[tokio::test]
async fn each_fetch_hits_the_server() {
    let site = spawn_site().await;
    let fetcher = ReqwestFetcher::new().unwrap();

    assert_eq!(fetcher.fetch(&site.url("/changes")).await.unwrap(), "changes 1");
    assert_eq!(fetcher.fetch(&site.url("/changes")).await.unwrap(), "changes 2");
}

#[tokio::test]
async fn error_status_is_an_http_error() {
    let site = spawn_site().await;
    let fetcher = ReqwestFetcher::new().unwrap();

    let err = fetcher.fetch(&site.url("/error")).await.unwrap_err();
    assert!(matches!(err, AppError::HttpError(_)));
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let fetcher = ReqwestFetcher::new().unwrap();

    let err = fetcher.fetch(&closed_port_url().await).await.unwrap_err();
    assert!(matches!(err, AppError::NetworkError(_)));
}

#[tokio::test]
async fn slow_response_times_out() {
    let site = spawn_site().await;
    let fetcher = ReqwestFetcher::with_timeout(Duration::from_millis(200)).unwrap();

    let err = fetcher.fetch(&site.url("/slow")).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(limit) if limit == Duration::from_millis(200)));
}
