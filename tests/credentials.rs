use pubhub::credentials::CredentialStore;
use pubhub::model::WordPressCredentials;

fn creds(url: &str) -> WordPressCredentials {
    WordPressCredentials {
        url: url.to_owned(),
        username: "editor".to_owned(),
        application_password: "abcd efgh ijkl mnop".to_owned(),
    }
}

#[tokio::test]
async fn save_then_get_round_trips_and_delete_removes() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = CredentialStore::new(temp.path());
    let saved = creds("https://blog.example.com");

    store.save("site1", &saved).await?;
    assert_eq!(store.get("site1").await?, Some(saved));

    assert!(store.delete("site1").await?);
    assert_eq!(store.get("site1").await?, None);
    assert!(!store.delete("site1").await?);
    Ok(())
}

#[tokio::test]
async fn invalid_url_is_rejected_before_any_write() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = CredentialStore::new(temp.path());

    let err = store
        .save("site1", &creds("blog.example.com"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("http://"), "{err:#}");
    assert!(!temp.path().join("credentials").exists());
    Ok(())
}

#[tokio::test]
async fn site_ids_cannot_traverse_directories() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = CredentialStore::new(temp.path());
    assert!(
        store
            .save("../escape", &creds("https://blog.example.com"))
            .await
            .is_err()
    );
    Ok(())
}
