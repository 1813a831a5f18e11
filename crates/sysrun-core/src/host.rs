/// The local machine's hostname, used by writers and the performance
/// summary template (`@HOSTNAME@`). Falls back to `"localhost"` if the
/// platform call fails or returns non-UTF-8 bytes, rather than bubbling an
/// error out of what is, everywhere it's used, a cosmetic label.
#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_nonempty() {
        assert!(!hostname().is_empty());
    }
}
