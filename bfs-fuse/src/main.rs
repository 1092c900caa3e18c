use anyhow::{bail, Context};
use bfs::{config::DEFAULT_IMAGE, Bfs, BlockFile, FormatOptions, Whence};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::fs::{read_dir, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// bytes moved per read/write call when copying files in and out
const COPY_CHUNK: usize = 4096;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "bfs=info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let defaults = FormatOptions::default();
    let total_blocks = defaults.total_blocks.to_string();
    let max_inodes = defaults.max_inodes.to_string();
    let image = Arg::with_name("image")
        .short("i")
        .long("image")
        .takes_value(true)
        .default_value(DEFAULT_IMAGE)
        .help("Disk image file");
    let blocks = Arg::with_name("blocks")
        .long("blocks")
        .takes_value(true)
        .default_value(&total_blocks)
        .help("Total blocks in the image");
    let inodes = Arg::with_name("inodes")
        .long("inodes")
        .takes_value(true)
        .default_value(&max_inodes)
        .help("Max number of files");

    let matches = App::new("BFS image tool")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(image)
        .subcommand(
            SubCommand::with_name("format")
                .about("Create an empty file system image")
                .arg(blocks.clone())
                .arg(inodes.clone()),
        )
        .subcommand(
            SubCommand::with_name("pack")
                .about("Create an image holding every file of a directory")
                .arg(
                    Arg::with_name("source")
                        .short("s")
                        .long("source")
                        .takes_value(true)
                        .required(true)
                        .help("Source directory"),
                )
                .arg(blocks)
                .arg(inodes),
        )
        .subcommand(
            SubCommand::with_name("put")
                .about("Copy a host file into the image")
                .arg(Arg::with_name("file").required(true).help("Host file"))
                .arg(
                    Arg::with_name("name")
                        .long("name")
                        .takes_value(true)
                        .help("Name inside the image (defaults to the file name)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Write a file of the image to stdout")
                .arg(Arg::with_name("name").required(true))
                .arg(
                    Arg::with_name("offset")
                        .long("offset")
                        .takes_value(true)
                        .default_value("0"),
                )
                .arg(Arg::with_name("len").long("len").takes_value(true)),
        )
        .subcommand(SubCommand::with_name("ls").about("List the files of the image"))
        .get_matches();

    let image = matches.value_of("image").unwrap_or(DEFAULT_IMAGE);
    match matches.subcommand() {
        ("format", Some(sub)) => {
            format_image(image, &format_options(sub)?)?;
        }
        ("pack", Some(sub)) => {
            let source = sub.value_of("source").context("missing --source")?;
            fs_pack(Path::new(source), image, &format_options(sub)?)?;
        }
        ("put", Some(sub)) => {
            let file = Path::new(sub.value_of("file").context("missing file")?);
            let name = match sub.value_of("name") {
                Some(name) => name.to_string(),
                None => file_name(file)?,
            };
            let mut bfs = mount(image)?;
            put(&mut bfs, file, &name)?;
        }
        ("cat", Some(sub)) => {
            let name = sub.value_of("name").context("missing name")?;
            let offset: i64 = sub.value_of("offset").unwrap_or("0").parse()?;
            let len = sub.value_of("len").map(str::parse::<usize>).transpose()?;
            let mut bfs = mount(image)?;
            let data = cat(&mut bfs, name, offset, len)?;
            std::io::stdout().write_all(&data)?;
        }
        ("ls", Some(_)) => {
            let mut bfs = mount(image)?;
            for name in bfs.list()? {
                println!("{name}");
            }
        }
        (other, _) => bail!("unknown command {other:?}"),
    }
    Ok(())
}

fn format_options(sub: &ArgMatches) -> anyhow::Result<FormatOptions> {
    let mut options = FormatOptions::default();
    if let Some(blocks) = sub.value_of("blocks") {
        options.total_blocks = blocks.parse().context("bad --blocks")?;
    }
    if let Some(inodes) = sub.value_of("inodes") {
        options.max_inodes = inodes.parse().context("bad --inodes")?;
    }
    Ok(options)
}

fn format_image(image: &str, options: &FormatOptions) -> anyhow::Result<Bfs> {
    let block_file = Arc::new(BlockFile::create(image, options.total_blocks)?);
    let bfs = Bfs::format(block_file, options)?;
    info!(image, "image created");
    Ok(bfs)
}

fn mount(image: &str) -> anyhow::Result<Bfs> {
    let block_file = Arc::new(BlockFile::open(image)?);
    Ok(Bfs::mount(block_file)?)
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("no file name in {}", path.display()))
}

/// Create `name` in the image with the contents of host file `file`.
fn put(bfs: &mut Bfs, file: &Path, name: &str) -> anyhow::Result<usize> {
    let mut host_file =
        File::open(file).with_context(|| format!("cannot open {}", file.display()))?;
    let fd = bfs.create(name)?;
    let mut chunk = [0u8; COPY_CHUNK];
    let mut total = 0usize;
    loop {
        let n = host_file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        bfs.write(fd, &chunk[..n])?;
        total += n;
    }
    bfs.close(fd)?;
    info!(name, bytes = total, "file stored");
    Ok(total)
}

/// Contents of `name` from `offset`, `len` bytes or up to the end.
fn cat(bfs: &mut Bfs, name: &str, offset: i64, len: Option<usize>) -> anyhow::Result<Vec<u8>> {
    let fd = bfs.open(name)?;
    bfs.seek(fd, offset, Whence::Set)?;
    let size = bfs.size(fd)?;
    let len = len.unwrap_or_else(|| size.saturating_sub(offset as usize));
    let mut data = vec![0u8; len];
    let mut filled = 0usize;
    while filled < len {
        let end = (filled + COPY_CHUNK).min(len);
        let n = bfs.read(fd, &mut data[filled..end])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    data.truncate(filled);
    bfs.close(fd)?;
    Ok(data)
}

/// Format `image` and copy every regular file of `source` into it.
fn fs_pack(source: &Path, image: &str, options: &FormatOptions) -> anyhow::Result<()> {
    let mut bfs = format_image(image, options)?;
    for entry in read_dir(source)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = file_name(&path)?;
        put(&mut bfs, &path, &name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfs::BLOCK_SZ;

    fn random_digits(len: usize) -> String {
        (0..len)
            .map(|_| char::from(b'0' + rand::random::<u8>() % 10))
            .collect()
    }

    #[test]
    fn bfs_test() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let image = tmp.path().join("fs.img");
        let image = image.to_str().unwrap();
        let options = FormatOptions {
            total_blocks: 4096,
            max_inodes: 8,
        };
        format_image(image, &options)?;

        let mut bfs = mount(image)?;
        let filea = bfs.create("filea")?;
        bfs.create("fileb")?;
        assert_eq!(bfs.list()?, vec!["filea", "fileb"]);

        let greet_str = "Hello, world!";
        bfs.write(filea, greet_str.as_bytes())?;
        bfs.seek(filea, 0, Whence::Set)?;
        let mut buffer = [0u8; 233];
        let len = bfs.read(filea, &mut buffer)?;
        assert_eq!(greet_str, core::str::from_utf8(&buffer[..len])?);

        let mut random_str_test = |len: usize| -> anyhow::Result<()> {
            let fd = bfs.create("filea")?;
            assert_eq!(bfs.read(fd, &mut buffer)?, 0, "not cleared!");
            let str = random_digits(len);
            bfs.write(fd, str.as_bytes())?;
            bfs.seek(fd, 0, Whence::Set)?;

            let mut read_buffer = [0u8; 127];
            let mut read_str = String::new();
            loop {
                let len = bfs.read(fd, &mut read_buffer)?;
                if len == 0 {
                    break;
                }
                read_str.push_str(core::str::from_utf8(&read_buffer[..len])?);
            }
            assert_eq!(str, read_str);
            bfs.close(fd)?;
            Ok(())
        };

        random_str_test(4 * BLOCK_SZ)?;
        random_str_test(8 * BLOCK_SZ + BLOCK_SZ / 2)?;
        random_str_test(100 * BLOCK_SZ)?;
        random_str_test(70 * BLOCK_SZ + BLOCK_SZ / 7)?;
        random_str_test((12 + 128) * BLOCK_SZ)?;
        Ok(())
    }

    #[test]
    fn pack_put_and_cat() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("apps");
        std::fs::create_dir(&source)?;
        std::fs::write(source.join("hello"), b"hello from the image")?;
        std::fs::write(source.join("big"), random_digits(5 * BLOCK_SZ + 3))?;
        std::fs::create_dir(source.join("skipped"))?;

        let image = tmp.path().join("fs.img");
        let image = image.to_str().unwrap();
        fs_pack(&source, image, &FormatOptions::default())?;

        let mut bfs = mount(image)?;
        let mut names = bfs.list()?;
        names.sort();
        assert_eq!(names, vec!["big", "hello"]);
        assert_eq!(cat(&mut bfs, "hello", 0, None)?, b"hello from the image");
        assert_eq!(cat(&mut bfs, "hello", 11, Some(3))?, b"the");
        assert_eq!(
            cat(&mut bfs, "big", 0, None)?,
            std::fs::read(source.join("big"))?
        );

        std::fs::write(tmp.path().join("hello"), b"replaced")?;
        put(&mut bfs, &tmp.path().join("hello"), "hello")?;
        assert_eq!(cat(&mut bfs, "hello", 0, None)?, b"replaced");
        assert!(cat(&mut bfs, "hello", 100, None)?.is_empty());
        assert!(cat(&mut bfs, "missing", 0, None).is_err());
        Ok(())
    }

    #[test]
    fn mount_missing_image() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("BFSDISK");
        assert!(mount(image.to_str().unwrap()).is_err());
    }
}
