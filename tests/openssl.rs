mod util;

use cipherkit::builder::KeyBuilder;
use cipherkit::ca::Ca;
use cipherkit::key::{EcdsaP256Key, KeyFamily, KeyFormat, RsaKey};
use cipherkit::pbes::{PbeFamily, PbeOpts};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::sign::Verifier;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509Req, X509StoreContext};
use regex::Regex;
use std::fs;
use std::process::Command;

use util::{PLAINTEXT, generate_ca_cert, rng, subject};

fn server_cert_pem() -> String {
    let ca = generate_ca_cert();
    Ca::new()
        .with_key(EcdsaP256Key::generate_with_rng(&mut rng(7)))
        .make_cert(
            subject("server.myca.local"),
            1,
            &["server.myca.local"],
            &["127.0.0.1"],
            "ECDSAWithSHA384",
        )
        .update_cert(|mut template| {
            template.serial_number = Some(vec![0x01]);
            template
        })
        .create_cert(&ca)
        .to_pem()
        .unwrap()
}

fn common_name(name: &openssl::x509::X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

#[test]
fn test_openssl_validate_cert() {
    let cert_path = std::env::temp_dir().join(format!("cipherkit_server_{}.pem", std::process::id()));
    fs::write(&cert_path, server_cert_pem()).expect("Failed to write server certificate");

    let output = Command::new("openssl")
        .arg("x509")
        .arg("-in")
        .arg(&cert_path)
        .arg("-noout")
        .arg("-text")
        .output()
        .expect("Failed to execute OpenSSL command");
    fs::remove_file(&cert_path).expect("Failed to remove test certificate");

    assert!(
        output.status.success(),
        "OpenSSL command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let output_text = String::from_utf8_lossy(&output.stdout);

    let expectations = [
        (r"Version: 3 \(0x2\)", "version"),
        (r"Serial Number: 1 \(0x1\)", "serial number"),
        (r"Signature Algorithm: ecdsa-with-SHA384", "signature algorithm"),
        (r"Issuer: C ?= ?US, O ?= ?CipherKit Test, CN ?= ?myca\.local", "issuer"),
        (r"Subject: C ?= ?US, O ?= ?CipherKit Test, CN ?= ?server\.myca\.local", "subject"),
        (r"Not Before: .+", "not before"),
        (r"Not After : .+", "not after"),
        (r"DNS:server\.myca\.local, IP Address:127\.0\.0\.1", "subject alternative name"),
        (r"TLS Web Client Authentication, TLS Web Server Authentication", "extended key usage"),
        (r"CA:FALSE", "basic constraints"),
    ];
    for (pattern, field) in expectations {
        assert!(
            Regex::new(pattern).unwrap().is_match(&output_text),
            "Missing or incorrect {field}:\n{output_text}"
        );
    }
}

#[test]
fn test_openssl_crate_validate_cert() {
    let ca = generate_ca_cert();
    let x509 = X509::from_pem(server_cert_pem().as_bytes()).expect("Failed to parse PEM");

    assert_eq!(common_name(x509.subject_name()), "server.myca.local");
    assert_eq!(common_name(x509.issuer_name()), "myca.local");
    assert_eq!(x509.version(), 2, "X509 version should be 3 (0-based index)");

    let serial = x509.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), "1");
    assert_eq!(x509.signature_algorithm().object().nid(), Nid::ECDSA_WITH_SHA384);

    let ca_x509 = X509::from_pem(ca.cert.to_pem().unwrap().as_bytes()).unwrap();
    assert!(x509.verify(&ca_x509.public_key().unwrap()).unwrap());
    assert!(ca_x509.verify(&ca_x509.public_key().unwrap()).unwrap());
}

#[test]
fn openssl_builds_a_chain_through_an_intermediate() {
    let root = generate_ca_cert();
    let intermediate = Ca::new()
        .with_key(EcdsaP256Key::generate_with_rng(&mut rng(11)))
        .make_ca(subject("Intermediate CA"), 5, "ECDSAWithSHA256")
        .create_cert(&root)
        .into_issuer()
        .unwrap();
    let leaf_pem = Ca::new()
        .with_key(EcdsaP256Key::generate_with_rng(&mut rng(12)))
        .make_cert(subject("chain.myca.local"), 1, &["chain.myca.local"], &[], "ECDSAWithSHA256")
        .create_cert(&intermediate)
        .to_pem()
        .unwrap();

    let root_x509 = X509::from_pem(root.cert.to_pem().unwrap().as_bytes()).unwrap();
    let intermediate_x509 = X509::from_pem(intermediate.cert.to_pem().unwrap().as_bytes()).unwrap();
    let leaf_x509 = X509::from_pem(leaf_pem.as_bytes()).unwrap();

    let mut store = X509StoreBuilder::new().unwrap();
    store.add_cert(root_x509).unwrap();
    let store = store.build();
    let mut untrusted = Stack::new().unwrap();
    untrusted.push(intermediate_x509).unwrap();

    let mut context = X509StoreContext::new().unwrap();
    let (verified, error) = context
        .init(&store, &leaf_x509, &untrusted, |ctx| {
            let verified = ctx.verify_cert()?;
            Ok((verified, ctx.error().to_string()))
        })
        .unwrap();
    assert!(verified, "chain rejected: {error}");
}

#[test]
fn openssl_accepts_rsa_and_pss_certificates() {
    let key = RsaKey::generate_with_rng(&mut rng(8), 1024).unwrap();
    for algorithm in ["SHA256WithRSA", "SHA384WithRSAPSS"] {
        let pem = Ca::new()
            .with_key(key.clone())
            .make_ca(subject("RSA Root"), 3, algorithm)
            .create_ca()
            .to_pem()
            .unwrap();
        let x509 = X509::from_pem(pem.as_bytes()).unwrap();
        assert!(x509.verify(&x509.public_key().unwrap()).unwrap(), "{algorithm}");
    }
}

#[test]
fn openssl_verifies_signing_request() {
    let pem = Ca::new()
        .with_key(EcdsaP256Key::generate_with_rng(&mut rng(9)))
        .make_csr(subject("client.myca.local"))
        .create_csr()
        .to_pem()
        .unwrap();
    let request = X509Req::from_pem(pem.as_bytes()).unwrap();
    assert!(request.verify(&request.public_key().unwrap()).unwrap());
    assert_eq!(common_name(request.subject_name()), "client.myca.local");
}

#[test]
fn openssl_decrypts_password_protected_keys() {
    let key = EcdsaP256Key::generate_with_rng(&mut rng(10));
    let pbes2 = PbeOpts::builder()
        .family(PbeFamily::Pbes2)
        .cipher_name("AES256CBC")
        .hash_name("SHA256")
        .build();
    for opts in [PbeOpts::pbes1("SHA1And3DES"), pbes2] {
        let pem = KeyBuilder::new()
            .with_key(key.clone())
            .create_private_key_with_password_rng(b"interop", &opts, &mut rng(11))
            .to_key_string()
            .unwrap();
        let pkey = PKey::private_key_from_pem_passphrase(pem.as_bytes(), b"interop").unwrap();
        let reopened = EcdsaP256Key::parse_private(KeyFormat::Pkcs8, &pkey.private_key_to_pkcs8().unwrap()).unwrap();
        assert_eq!(reopened.public_key(), key.public_key(), "{}", opts.cipher_name);
    }
}

#[test]
fn openssl_verifies_rsa_signatures() {
    let key = RsaKey::generate_with_rng(&mut rng(12), 1024).unwrap();
    let public_pem = KeyBuilder::new()
        .with_key(key.clone())
        .create_public_key(KeyFormat::Pkcs8)
        .to_key_string()
        .unwrap();
    let public = PKey::public_key_from_pem(public_pem.as_bytes()).unwrap();

    for (name, digest) in [
        ("SHA1", MessageDigest::sha1()),
        ("SHA256", MessageDigest::sha256()),
        ("SHA512", MessageDigest::sha512()),
    ] {
        let signature = KeyBuilder::new()
            .with_key(key.clone())
            .from_bytes(PLAINTEXT)
            .with_sign_hash(name)
            .sign()
            .to_bytes()
            .unwrap();
        let mut verifier = Verifier::new(digest, &public).unwrap();
        verifier.update(PLAINTEXT).unwrap();
        assert!(verifier.verify(&signature).unwrap(), "{name}");
    }
}
