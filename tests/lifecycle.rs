use std::io::Write;

use chrono::DateTime;
use pgp_handles::{
    DecryptionParamsBuilder, Encoding, EncryptionParamsBuilder, Error, ErrorKind,
    KeyGenerationParamsBuilder, Pgp, PrivateKey, SecurityLevel, SignParamsBuilder, SplitWriter,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use testresult::TestResult;

fn generate(pgp: &Pgp, seed: u64) -> PrivateKey {
    pgp.key_generation(
        KeyGenerationParamsBuilder::default()
            .user_id("grace <grace@example.org>")
            .generation_time(DateTime::from_timestamp(1_700_000_000, 0).expect("valid"))
            .build()
            .expect("valid params"),
    )
    .expect("handle")
    .generate_key_with_rng(ChaCha8Rng::seed_from_u64(seed), SecurityLevel::Standard)
    .expect("generated key")
}

#[test]
fn clear_private_params_once() -> TestResult {
    let _ = pretty_env_logger::try_init();
    let pgp = Pgp::new();
    let key = generate(&pgp, 50);
    let signer = pgp.sign(SignParamsBuilder::default().signing_key(key.clone()).build()?)?;
    assert!(!signer.sign(b"before", Encoding::Bytes)?.is_empty());

    signer.clear_private_params()?;
    assert!(key.is_cleared());

    let err = signer.clear_private_params().unwrap_err();
    assert!(matches!(err, Error::AlreadyCleared));
    assert_eq!(err.kind(), ErrorKind::Usage);

    // cleared material stays cleared
    assert!(key.is_cleared());
    assert!(matches!(
        signer.sign(b"after", Encoding::Bytes),
        Err(Error::PrivateParamsCleared)
    ));
    assert!(matches!(
        pgp.sign(SignParamsBuilder::default().signing_key(key).build()?),
        Err(Error::PrivateParamsCleared)
    ));
    Ok(())
}

#[test]
fn decrypt_with_cleared_key() -> TestResult {
    let pgp = Pgp::new();
    let key = generate(&pgp, 51);
    let message = pgp
        .encryption(
            EncryptionParamsBuilder::default()
                .recipient(key.public_key().clone())
                .build()?,
        )?
        .encrypt(b"secret")?;

    let decryption = pgp.decryption(
        DecryptionParamsBuilder::default()
            .decryption_key(key)
            .build()?,
    )?;
    decryption.clear_private_params()?;
    assert!(matches!(
        decryption.decrypt(&message.to_bytes(), Encoding::Bytes),
        Err(Error::PrivateParamsCleared)
    ));
    Ok(())
}

#[test]
fn close_twice_is_a_usage_error() -> TestResult {
    let pgp = Pgp::new();
    let encryption = pgp.encryption(EncryptionParamsBuilder::default().password("pw").build()?)?;

    let mut keys = Vec::new();
    let mut data = Vec::new();
    let mut writer = encryption
        .encrypting_writer(SplitWriter::key_and_data(&mut keys, &mut data), Encoding::Armor)?;
    writer.write_all(b"once")?;
    writer.close()?;
    assert!(writer.is_closed());

    let err = writer.close().unwrap_err();
    assert!(matches!(err, Error::AlreadyClosed));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(writer.write_all(b"again").is_err());
    drop(writer);

    assert!(String::from_utf8(keys)?.starts_with("-----BEGIN PGP MESSAGE-----"));
    assert!(String::from_utf8(data)?.trim_end().ends_with("-----END PGP MESSAGE-----"));
    Ok(())
}

#[test]
fn handles_are_shared_between_threads() -> TestResult {
    let pgp = Pgp::new();
    let key = generate(&pgp, 52);
    let encryption = pgp.encryption(
        EncryptionParamsBuilder::default()
            .recipient(key.public_key().clone())
            .build()?,
    )?;
    let decryption = pgp.decryption(
        DecryptionParamsBuilder::default()
            .decryption_key(key)
            .build()?,
    )?;

    std::thread::scope(|scope| {
        for i in 0..4u8 {
            let (encryption, decryption) = (&encryption, &decryption);
            scope.spawn(move || {
                let message = encryption.encrypt([i; 16]).expect("encrypted");
                let plain = decryption
                    .decrypt(&message.to_bytes(), Encoding::Bytes)
                    .expect("decrypted");
                assert_eq!(plain.bytes(), &[i; 16]);
            });
        }
    });
    Ok(())
}

#[test]
fn detached_signature_needs_a_signature_channel() -> TestResult {
    let pgp = Pgp::new();
    let key = generate(&pgp, 53);
    let encryption = pgp.encryption(
        EncryptionParamsBuilder::default()
            .recipient(key.public_key().clone())
            .signing_key(key.clone())
            .detached_signature(true)
            .build()?,
    )?;

    let mut plain = Vec::new();
    assert!(matches!(
        encryption.encrypting_writer(&mut plain, Encoding::Bytes),
        Err(Error::Configuration { .. })
    ));
    assert!(plain.is_empty());

    let mut keys = Vec::new();
    let mut data = Vec::new();
    let mut signature = Vec::new();
    {
        let destination =
            SplitWriter::key_and_data(&mut keys, &mut data).with_signature(&mut signature);
        let mut writer = encryption.encrypting_writer(destination, Encoding::Bytes)?;
        writer.write_all(b"signed apart")?;
        writer.close()?;
    }
    assert!(!signature.is_empty());

    // encrypt wires the signature channel itself
    let message = encryption.encrypt(b"signed apart")?;
    assert!(message.detached_signature().is_some());
    Ok(())
}
