//! Legacy pay-to-pubkey-hash transactions with an `OP_RETURN` overlay marker.

use crate::codec::{InputUnlock, OverlayPayload, TransactionCodec, TxInputRef, TxOutputSpec};
use crate::config::AddressPrefix;
use anyhow::{anyhow, bail, Context};
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;

const SIGHASH_ALL: u8 = 0x01;
const TX_VERSION: u32 = 1;
const SEQUENCE_FINAL: u32 = 0xffff_ffff;
const OVERLAY_MAGIC: &[u8; 4] = b"omni";

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn base58_address(version: u8, hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

pub fn p2pkh_address(public_key: &[u8], prefix: AddressPrefix) -> String {
    base58_address(prefix.p2pkh, &hash160(public_key))
}

fn p2pkh_script(pubkey_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

fn p2sh_script(script_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 0x14]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// Locking script paying to `address`, which must belong to `prefix`'s network.
pub fn locking_script(address: &str, prefix: AddressPrefix) -> anyhow::Result<Vec<u8>> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|err| anyhow!("invalid address {}: {}", address, err))?;
    if decoded.len() != 21 {
        bail!("invalid address {}: length {}", address, decoded.len());
    }
    match decoded[0] {
        version if version == prefix.p2pkh => Ok(p2pkh_script(&decoded[1..])),
        version if version == prefix.p2sh => Ok(p2sh_script(&decoded[1..])),
        version => bail!(
            "address {} has version {:#04x} outside of the network prefix",
            address,
            version
        ),
    }
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[..3] == [OP_DUP, OP_HASH160, 0x14]
        && script[23..] == [OP_EQUALVERIFY, OP_CHECKSIG]
}

fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[..2] == [OP_HASH160, 0x14] && script[22] == OP_EQUAL
}

fn script_address(script: &[u8], prefix: AddressPrefix) -> anyhow::Result<String> {
    if is_p2pkh(script) {
        Ok(base58_address(prefix.p2pkh, &script[3..23]))
    } else if is_p2sh(script) {
        Ok(base58_address(prefix.p2sh, &script[2..22]))
    } else {
        bail!("unsupported locking script {}", hex::encode(script))
    }
}

fn overlay_script(payload: &OverlayPayload) -> Vec<u8> {
    let mut data = Vec::with_capacity(20);
    data.extend_from_slice(OVERLAY_MAGIC);
    data.extend_from_slice(&payload.version.to_be_bytes());
    data.extend_from_slice(&payload.transfer_type.to_be_bytes());
    data.extend_from_slice(&payload.property_id.to_be_bytes());
    data.extend_from_slice(&payload.amount.to_be_bytes());

    let mut script = vec![OP_RETURN, data.len() as u8];
    script.extend(data);
    script
}

fn parse_overlay_script(script: &[u8]) -> Option<OverlayPayload> {
    if script.len() != 22 || script[0] != OP_RETURN || script[1] != 20 {
        return None;
    }
    let data = &script[2..];
    if &data[..4] != OVERLAY_MAGIC {
        return None;
    }
    Some(OverlayPayload {
        version: u16::from_be_bytes([data[4], data[5]]),
        transfer_type: u16::from_be_bytes([data[6], data[7]]),
        property_id: u32::from_be_bytes(data[8..12].try_into().ok()?),
        amount: u64::from_be_bytes(data[12..20].try_into().ok()?),
    })
}

fn txid_to_bytes(tx_id: &str) -> anyhow::Result<[u8; 32]> {
    let mut bytes = hex::decode(tx_id).with_context(|| format!("invalid txid {}", tx_id))?;
    if bytes.len() != 32 {
        bail!("invalid txid {}: length {}", tx_id, bytes.len());
    }
    bytes.reverse();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

fn push_data(buf: &mut Vec<u8>, data: &[u8]) -> anyhow::Result<()> {
    if data.len() >= 0x4c {
        bail!("push of {} bytes is not supported", data.len());
    }
    buf.push(data.len() as u8);
    buf.extend_from_slice(data);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, len: usize) -> anyhow::Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| anyhow!("unexpected end of data at {}", self.position))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> anyhow::Result<u32> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(out))
    }

    fn u64(&mut self) -> anyhow::Result<u64> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(out))
    }

    fn varint(&mut self) -> anyhow::Result<u64> {
        match self.u8()? {
            0xfd => {
                let mut out = [0u8; 2];
                out.copy_from_slice(self.take(2)?);
                Ok(u16::from_le_bytes(out) as u64)
            }
            0xfe => Ok(self.u32()? as u64),
            0xff => self.u64(),
            n => Ok(n as u64),
        }
    }

    fn var_bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        let len = usize::try_from(self.varint()?)?;
        Ok(self.take(len)?.to_vec())
    }

    fn is_empty(&self) -> bool {
        self.position == self.bytes.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct RawInput {
    prev_tx: [u8; 32],
    vout: u32,
    script_sig: Vec<u8>,
    sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct RawOutput {
    value: u64,
    script: Vec<u8>,
}

/// Decoded legacy transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTransaction {
    version: u32,
    inputs: Vec<RawInput>,
    outputs: Vec<RawOutput>,
    lock_time: u32,
}

impl RawTransaction {
    pub fn from_hex(raw_hex: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(raw_hex).context("invalid transaction hex data")?;
        Self::parse(&bytes)
    }

    fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.u32()?;

        let input_count = reader.varint()?;
        let mut inputs = vec![];
        for _ in 0..input_count {
            let mut prev_tx = [0u8; 32];
            prev_tx.copy_from_slice(reader.take(32)?);
            inputs.push(RawInput {
                prev_tx,
                vout: reader.u32()?,
                script_sig: reader.var_bytes()?,
                sequence: reader.u32()?,
            });
        }

        let output_count = reader.varint()?;
        let mut outputs = vec![];
        for _ in 0..output_count {
            outputs.push(RawOutput {
                value: reader.u64()?,
                script: reader.var_bytes()?,
            });
        }

        let lock_time = reader.u32()?;
        if !reader.is_empty() {
            bail!("trailing bytes after transaction");
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for input in self.inputs.iter() {
            buf.extend_from_slice(&input.prev_tx);
            buf.extend_from_slice(&input.vout.to_le_bytes());
            write_varint(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut buf, self.outputs.len() as u64);
        for output in self.outputs.iter() {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut buf, output.script.len() as u64);
            buf.extend_from_slice(&output.script);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Display-order transaction id.
    pub fn tx_id(&self) -> String {
        let mut hash = double_sha256(&self.serialize());
        hash.reverse();
        hex::encode(hash)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Spent outputs as `(txid, vout)` in display order.
    pub fn previous_outputs(&self) -> Vec<(String, u32)> {
        self.inputs
            .iter()
            .map(|input| {
                let mut tx_id = input.prev_tx;
                tx_id.reverse();
                (hex::encode(tx_id), input.vout)
            })
            .collect()
    }

    pub fn output_values(&self) -> Vec<u64> {
        self.outputs.iter().map(|output| output.value).collect()
    }

    /// Address of every paying output, `None` for the overlay marker.
    pub fn output_addresses(&self, prefix: AddressPrefix) -> Vec<Option<String>> {
        self.outputs
            .iter()
            .map(|output| script_address(&output.script, prefix).ok())
            .collect()
    }

    pub fn overlay_payload(&self) -> Option<OverlayPayload> {
        self.outputs
            .iter()
            .find_map(|output| parse_overlay_script(&output.script))
    }

    fn sighash(&self, index: usize, locking_script: &[u8]) -> [u8; 32] {
        let mut copy = self.clone();
        for (position, input) in copy.inputs.iter_mut().enumerate() {
            input.script_sig = if position == index {
                locking_script.to_vec()
            } else {
                vec![]
            };
        }
        let mut bytes = copy.serialize();
        bytes.extend_from_slice(&(SIGHASH_ALL as u32).to_le_bytes());
        double_sha256(&bytes)
    }
}

fn parse_script_sig(script_sig: &[u8]) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
    let mut reader = Reader::new(script_sig);
    let signature_len = reader.u8()? as usize;
    let signature = reader.take(signature_len)?.to_vec();
    let public_key_len = reader.u8()? as usize;
    let public_key = reader.take(public_key_len)?.to_vec();
    if !reader.is_empty() {
        bail!("unexpected data in unlocking script");
    }
    Ok((signature, public_key))
}

fn digest_message(digest: &[u8]) -> anyhow::Result<Message> {
    let digest: [u8; 32] = digest
        .try_into()
        .map_err(|_| anyhow!("digest must be 32 bytes, got {}", digest.len()))?;
    Ok(Message::from_digest(digest))
}

pub struct P2pkhCodec {
    secp: Secp256k1<All>,
}

impl Default for P2pkhCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl P2pkhCodec {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    fn verify_input(
        &self,
        tx: &RawTransaction,
        unlock: &InputUnlock,
        prefix: AddressPrefix,
    ) -> anyhow::Result<bool> {
        let input = tx
            .inputs
            .get(unlock.input_index)
            .ok_or_else(|| anyhow!("no input {}", unlock.input_index))?;
        let (mut signature, public_key) = parse_script_sig(&input.script_sig)?;
        if signature.pop() != Some(SIGHASH_ALL) {
            return Ok(false);
        }

        let locking = hex::decode(&unlock.locking_script)?;
        if !is_p2pkh(&locking) {
            return Ok(false);
        }
        let owner = script_address(&locking, prefix)?;
        if owner != unlock.address || p2pkh_address(&public_key, prefix) != owner {
            return Ok(false);
        }

        let message = digest_message(&tx.sighash(unlock.input_index, &locking))?;
        let signature = Signature::from_der(&signature)?;
        let public_key = PublicKey::from_slice(&public_key)?;
        Ok(self
            .secp
            .verify_ecdsa(&message, &signature, &public_key)
            .is_ok())
    }
}

impl TransactionCodec for P2pkhCodec {
    fn build_unsigned(
        &self,
        inputs: &[TxInputRef],
        outputs: &[TxOutputSpec],
        prefix: AddressPrefix,
    ) -> anyhow::Result<String> {
        let mut raw_inputs = vec![];
        for input in inputs.iter() {
            raw_inputs.push(RawInput {
                prev_tx: txid_to_bytes(&input.tx_id)?,
                vout: input.vout,
                script_sig: vec![],
                sequence: SEQUENCE_FINAL,
            });
        }

        let mut raw_outputs = vec![];
        for output in outputs.iter() {
            raw_outputs.push(match output {
                TxOutputSpec::Payment { address, value } => RawOutput {
                    value: value.units(),
                    script: locking_script(address, prefix)?,
                },
                TxOutputSpec::OverlayMarker(payload) => RawOutput {
                    value: 0,
                    script: overlay_script(payload),
                },
            });
        }

        let tx = RawTransaction {
            version: TX_VERSION,
            inputs: raw_inputs,
            outputs: raw_outputs,
            lock_time: 0,
        };
        Ok(tx.to_hex())
    }

    fn signing_digests(&self, raw_hex: &str, inputs: &[TxInputRef]) -> anyhow::Result<Vec<String>> {
        let tx = RawTransaction::from_hex(raw_hex)?;
        if tx.inputs.len() != inputs.len() {
            bail!(
                "transaction has {} inputs, {} locking scripts given",
                tx.inputs.len(),
                inputs.len()
            );
        }
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let locking = hex::decode(&input.locking_script)
                    .with_context(|| format!("invalid locking script of input {}", index))?;
                Ok(hex::encode(tx.sighash(index, &locking)))
            })
            .collect()
    }

    fn sign_digest(&self, digest_hex: &str, secret: &[u8]) -> anyhow::Result<String> {
        let message = digest_message(&hex::decode(digest_hex)?)?;
        let secret_key = SecretKey::from_slice(secret)?;
        let signature = self.secp.sign_ecdsa(&message, &secret_key);
        Ok(hex::encode(signature.serialize_der().to_vec()))
    }

    fn public_key(&self, secret: &[u8]) -> anyhow::Result<String> {
        let secret_key = SecretKey::from_slice(secret)?;
        Ok(hex::encode(
            PublicKey::from_secret_key(&self.secp, &secret_key).serialize(),
        ))
    }

    fn unlock_address(&self, locking_script: &str, prefix: AddressPrefix) -> anyhow::Result<String> {
        script_address(&hex::decode(locking_script)?, prefix)
    }

    fn insert_signatures(&self, raw_hex: &str, unlocks: &[InputUnlock]) -> anyhow::Result<String> {
        let mut tx = RawTransaction::from_hex(raw_hex)?;
        if tx.inputs.len() != unlocks.len() {
            bail!(
                "transaction has {} inputs, {} signatures given",
                tx.inputs.len(),
                unlocks.len()
            );
        }
        for unlock in unlocks.iter() {
            let input = tx
                .inputs
                .get_mut(unlock.input_index)
                .ok_or_else(|| anyhow!("no input {}", unlock.input_index))?;
            let mut signature = hex::decode(&unlock.signature_hex)?;
            signature.push(SIGHASH_ALL);
            let mut script_sig = vec![];
            push_data(&mut script_sig, &signature)?;
            push_data(&mut script_sig, &hex::decode(&unlock.public_key_hex)?)?;
            input.script_sig = script_sig;
        }
        Ok(tx.to_hex())
    }

    fn verify(
        &self,
        signed_hex: &str,
        unlocks: &[InputUnlock],
        prefix: AddressPrefix,
    ) -> anyhow::Result<bool> {
        let tx = RawTransaction::from_hex(signed_hex)?;
        if tx.inputs.is_empty() || tx.inputs.len() != unlocks.len() {
            return Ok(false);
        }
        for unlock in unlocks.iter() {
            match self.verify_input(&tx, unlock, prefix) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(err) => {
                    tracing::debug!("input {} does not verify: {}", unlock.input_index, err);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::codec::p2pkh::{locking_script, p2pkh_address, P2pkhCodec, RawTransaction};
    use crate::codec::{InputUnlock, OverlayPayload, TransactionCodec, TxInputRef, TxOutputSpec};
    use crate::config::AddressPrefix;

    const SECRET: [u8; 32] = [7u8; 32];

    fn owned_input(codec: &P2pkhCodec, vout: u32) -> (String, TxInputRef) {
        let public_key = hex::decode(codec.public_key(&SECRET).unwrap()).unwrap();
        let address = p2pkh_address(&public_key, AddressPrefix::TESTNET);
        let script = locking_script(&address, AddressPrefix::TESTNET).unwrap();
        (
            address,
            TxInputRef {
                tx_id: format!("{:064x}", 42),
                vout,
                locking_script: hex::encode(script),
                amount: Amount::from(10_000),
            },
        )
    }

    fn signed(codec: &P2pkhCodec, outputs: &[TxOutputSpec]) -> (String, Vec<InputUnlock>) {
        let (address, input) = owned_input(codec, 1);
        let inputs = vec![input];
        let raw = codec
            .build_unsigned(&inputs, outputs, AddressPrefix::TESTNET)
            .unwrap();
        let digests = codec.signing_digests(&raw, &inputs).unwrap();
        let unlocks = vec![InputUnlock {
            input_index: 0,
            address,
            locking_script: inputs[0].locking_script.clone(),
            signature_hex: codec.sign_digest(&digests[0], &SECRET).unwrap(),
            public_key_hex: codec.public_key(&SECRET).unwrap(),
        }];
        let signed = codec.insert_signatures(&raw, &unlocks).unwrap();
        (signed, unlocks)
    }

    #[test]
    fn address_round_trips_through_script() {
        let codec = P2pkhCodec::new();
        let (address, input) = owned_input(&codec, 0);
        assert_eq!(
            codec
                .unlock_address(&input.locking_script, AddressPrefix::TESTNET)
                .unwrap(),
            address
        );
        assert!(locking_script(&address, AddressPrefix::MAINNET).is_err());
    }

    #[test]
    fn sign_and_verify() {
        let codec = P2pkhCodec::new();
        let (receiver, _) = owned_input(&codec, 0);
        let outputs = vec![TxOutputSpec::Payment {
            address: receiver,
            value: Amount::from(9_000),
        }];
        let (signed, unlocks) = signed(&codec, &outputs);
        assert!(codec
            .verify(&signed, &unlocks, AddressPrefix::TESTNET)
            .unwrap());
        assert!(!codec
            .verify(&signed, &unlocks, AddressPrefix::MAINNET)
            .unwrap());

        let tx = RawTransaction::from_hex(&signed).unwrap();
        assert_eq!(tx.output_values(), vec![9_000]);
        assert_eq!(tx.previous_outputs(), vec![(format!("{:064x}", 42), 1)]);
        assert_eq!(tx.tx_id().len(), 64);
    }

    #[test]
    fn tampered_transaction_fails() {
        let codec = P2pkhCodec::new();
        let (receiver, _) = owned_input(&codec, 0);
        let outputs = vec![TxOutputSpec::Payment {
            address: receiver,
            value: Amount::from(9_000),
        }];
        let (signed, unlocks) = signed(&codec, &outputs);
        // the output value is the 8 bytes following the output count
        let tampered = signed.replacen("2823000000000000", "2923000000000000", 1);
        assert_ne!(tampered, signed);
        assert!(!codec
            .verify(&tampered, &unlocks, AddressPrefix::TESTNET)
            .unwrap());
    }

    #[test]
    fn overlay_marker_layout() {
        let codec = P2pkhCodec::new();
        let (receiver, input) = owned_input(&codec, 0);
        let outputs = vec![
            TxOutputSpec::OverlayMarker(OverlayPayload::simple_send(31, 150_000_000)),
            TxOutputSpec::Payment {
                address: receiver.clone(),
                value: Amount::from(546),
            },
        ];
        let raw = codec
            .build_unsigned(&[input], &outputs, AddressPrefix::TESTNET)
            .unwrap();
        assert!(raw.contains("6a146f6d6e69000000000000001f0000000008f0d180"));

        let tx = RawTransaction::from_hex(&raw).unwrap();
        assert_eq!(
            tx.overlay_payload(),
            Some(OverlayPayload::simple_send(31, 150_000_000))
        );
        assert_eq!(tx.output_values(), vec![0, 546]);
        assert_eq!(
            tx.output_addresses(AddressPrefix::TESTNET),
            vec![None, Some(receiver)]
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RawTransaction::from_hex("0100").is_err());
        assert!(RawTransaction::from_hex("zz").is_err());
    }
}
