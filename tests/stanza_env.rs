use backrest_bridge::Stanza;
use backrest_bridge::envvar::merge_env;
use backrest_bridge::stanza::{SecretKeySelector, credentials_env, selected_repository_env};

const STANZA_JSON: &str = r#"{
    "name": "main",
    "s3Repositories": [
        {
            "bucket": "demo",
            "endpoint": "s3.minio.svc.cluster.local",
            "region": "us-east-1",
            "repoPath": "/cluster-demo",
            "uriStyle": "path",
            "verifyTLS": false,
            "retentionPolicy": {"full": 7, "fullType": "count"},
            "secretRef": {
                "accessKeyId": {"name": "minio", "key": "ACCESS_KEY_ID"},
                "secretAccessKey": {"name": "minio", "key": "ACCESS_SECRET_KEY"}
            }
        }
    ],
    "azureRepositories": [
        {
            "account": "backups",
            "container": "pg",
            "repoPath": "/cluster-demo",
            "secretRef": {"keyReference": {"name": "azure", "key": "KEY"}}
        }
    ],
    "processMax": 2
}"#;

#[test]
fn stanza_and_credentials_share_repository_numbers() {
    let stanza: Stanza = serde_json::from_str(STANZA_JSON).unwrap();
    let env = stanza.to_env(None);

    assert!(env.contains(&"PGBACKREST_REPO1_S3_BUCKET=demo".to_string()));
    assert!(env.contains(&"PGBACKREST_REPO1_S3_VERIFY_TLS=n".to_string()));
    assert!(env.contains(&"PGBACKREST_REPO1_RETENTION_FULL=7".to_string()));
    assert!(env.contains(&"PGBACKREST_REPO2_AZURE_ACCOUNT=backups".to_string()));
    assert!(env.contains(&"PGBACKREST_PROCESS_MAX=2".to_string()));
    assert!(env.contains(&"PGBACKREST_LOCK_PATH=/controller/tmp/pgbackrest-cnpg-plugin.lock".to_string()));

    let resolver = |s: &SecretKeySelector| -> anyhow::Result<String> { Ok(format!("{}-{}", s.name, s.key)) };
    let credentials = credentials_env(&stanza, &resolver).unwrap();
    assert!(credentials.contains(&"PGBACKREST_REPO1_S3_KEY=minio-ACCESS_KEY_ID".to_string()));
    assert!(credentials.contains(&"PGBACKREST_REPO2_AZURE_KEY=azure-KEY".to_string()));
    assert!(credentials.contains(&"PGBACKREST_REPO2_TYPE=azure".to_string()));

    let selected = selected_repository_env(&stanza, "2").unwrap();
    let merged = merge_env(env.iter().chain(&credentials).chain([&selected]));
    let repo: Vec<_> = merged.iter().filter(|(k, _)| k == "PGBACKREST_REPO").collect();
    assert_eq!(repo, vec![&("PGBACKREST_REPO".to_string(), "2".to_string())]);
}
